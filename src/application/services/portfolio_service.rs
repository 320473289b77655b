//! Portfolio & pricing operations shared by every strategy.
//!
//! Composes the exchange gateway and the stores into business operations.
//! Gateway and store failures are logged and propagated; a store that
//! reports it wrote nothing is treated as a failure too.

use crate::domain::clock::Clock;
use crate::domain::entities::daily_return::DailyReturn;
use crate::domain::entities::order::MarketOrder;
use crate::domain::entities::position::{Portfolio, Position};
use crate::domain::entities::price_snapshot::{latest_for, PriceSnapshot};
use crate::domain::entities::strategy_log::StrategyLog;
use crate::domain::entities::target_weighting::TargetWeighting;
use crate::domain::errors::{PersistenceError, TradingError, TradingResult};
use crate::domain::repositories::exchange_gateway::ExchangeGateway;
use crate::domain::repositories::stores::{
    DailyReturnStore, OrderStore, PositionStore, PriceSnapshotStore, StrategyLogStore,
    TargetWeightingStore,
};
use bigdecimal::{BigDecimal, One, Zero};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Completion polls before an order is cancelled.
pub const MAX_RETRIES: u32 = 10;

/// Delay between completion polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq)]
pub struct OrderPollingConfig {
    pub max_retries: u32,
    pub poll_interval: Duration,
}

impl Default for OrderPollingConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            poll_interval: POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Exchange label stamped on every record.
    pub exchange: String,
    /// Cash currency; priced at 1 and used for buy-side balance checks.
    pub quote_currency: String,
    /// Assets whose snapshots are kept. Empty keeps everything.
    pub tracked_assets: Vec<String>,
    pub order_polling: OrderPollingConfig,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            exchange: "CoinSpot".to_string(),
            quote_currency: "AUD".to_string(),
            tracked_assets: vec!["BTC".to_string(), "ETH".to_string(), "XRP".to_string()],
            order_polling: OrderPollingConfig::default(),
        }
    }
}

/// The persistence collaborators, one per entity type.
#[derive(Clone)]
pub struct Stores {
    pub positions: Arc<dyn PositionStore>,
    pub prices: Arc<dyn PriceSnapshotStore>,
    pub logs: Arc<dyn StrategyLogStore>,
    pub weightings: Arc<dyn TargetWeightingStore>,
    pub daily_returns: Arc<dyn DailyReturnStore>,
    pub orders: Arc<dyn OrderStore>,
}

pub struct PortfolioService {
    gateway: Arc<dyn ExchangeGateway>,
    stores: Stores,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

fn ensure_saved(saved: bool, what: &str) -> Result<(), PersistenceError> {
    if saved {
        Ok(())
    } else {
        error!("Store rejected write of {}", what);
        Err(PersistenceError::WriteRejected(what.to_string()))
    }
}

impl PortfolioService {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        stores: Stores,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            gateway,
            stores,
            clock,
            settings,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.settings.exchange
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn is_tracked(&self, name: &str) -> bool {
        self.settings.tracked_assets.is_empty()
            || self.settings.tracked_assets.iter().any(|a| a == name)
    }

    /// Fetches current quotes for tracked assets and records them as one batch.
    pub async fn get_price_snapshots(&self) -> TradingResult<Vec<PriceSnapshot>> {
        let snapshots: Vec<PriceSnapshot> = self
            .gateway
            .get_price_snapshots()
            .await
            .map_err(|e| {
                error!("Failed to fetch price snapshots: {}", e);
                e
            })?
            .into_iter()
            .filter(|s| self.is_tracked(&s.name))
            .collect();

        if !snapshots.is_empty() {
            let saved = self.stores.prices.save_price_snapshots(&snapshots).await?;
            ensure_saved(saved, "price snapshots")?;
            debug!("Saved {} price snapshots", snapshots.len());
        }

        Ok(snapshots)
    }

    /// Current quotes for tracked assets, without recording them.
    pub async fn get_current_prices(&self) -> TradingResult<Vec<PriceSnapshot>> {
        let quotes = self.gateway.get_price_snapshots().await.map_err(|e| {
            error!("Failed to fetch current prices: {}", e);
            e
        })?;
        Ok(quotes
            .into_iter()
            .filter(|s| self.is_tracked(&s.name))
            .collect())
    }

    /// Current holdings priced at the latest `last` quote, recorded as one batch.
    pub async fn get_portfolio(&self) -> TradingResult<Portfolio> {
        let now = self.clock.now();
        let balances = self.gateway.get_portfolio().await.map_err(|e| {
            error!("Failed to fetch balances: {}", e);
            e
        })?;
        let quotes = self.gateway.get_price_snapshots().await.map_err(|e| {
            error!("Failed to fetch prices for portfolio: {}", e);
            e
        })?;

        let positions: Vec<Position> = balances
            .into_iter()
            .map(|balance| {
                let price = if balance.name == self.settings.quote_currency {
                    BigDecimal::one()
                } else {
                    match latest_for(&quotes, &balance.name) {
                        Some(quote) => quote.last.clone(),
                        None => {
                            warn!("No quote for held asset {}, valuing at zero", balance.name);
                            BigDecimal::zero()
                        }
                    }
                };
                Position::new(
                    self.settings.exchange.as_str(),
                    balance.name,
                    balance.quantity,
                    price,
                    now,
                )
            })
            .collect();

        if !positions.is_empty() {
            let saved = self.stores.positions.save_positions(&positions).await?;
            ensure_saved(saved, "positions")?;
        }

        Ok(Portfolio::new(self.settings.exchange.as_str(), positions))
    }

    /// Earliest recorded snapshot per asset per day in `[from, to)`.
    pub async fn get_daily_prices(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TradingResult<Vec<PriceSnapshot>> {
        Ok(self.stores.prices.get_daily_price_snapshots(from, to).await?)
    }

    /// Buys `quantity` of `asset` and waits for the fill.
    ///
    /// Fails before submission when the quote-currency balance cannot cover
    /// `quantity x ask`.
    pub async fn place_market_buy(
        &self,
        asset: &str,
        quantity: &BigDecimal,
    ) -> TradingResult<MarketOrder> {
        let quotes = self.gateway.get_price_snapshots().await?;
        let ask = latest_for(&quotes, asset)
            .map(|q| q.ask.clone())
            .filter(|ask| *ask > BigDecimal::zero())
            .ok_or_else(|| TradingError::PriceUnavailable(asset.to_string()))?;

        let required = quantity * &ask;
        let available = self.balance_of(&self.settings.quote_currency).await?;
        if required > available {
            warn!(
                "Insufficient {} to buy {} {}: required {}, available {}",
                self.settings.quote_currency, quantity, asset, required, available
            );
            return Err(TradingError::InsufficientBalance {
                asset: self.settings.quote_currency.clone(),
                required,
                available,
            });
        }

        info!("Placing market buy: {} {} at ~{}", quantity, asset, ask);
        let order = self.gateway.place_market_buy(asset, quantity).await.map_err(|e| {
            error!("Market buy of {} {} failed: {}", quantity, asset, e);
            e
        })?;
        self.await_order_completion(order).await
    }

    /// Sells `quantity` of `asset` and waits for the fill.
    ///
    /// Fails before submission when less than `quantity` is held.
    pub async fn place_market_sell(
        &self,
        asset: &str,
        quantity: &BigDecimal,
    ) -> TradingResult<MarketOrder> {
        let available = self.balance_of(asset).await?;
        if *quantity > available {
            warn!(
                "Insufficient {} to sell: required {}, available {}",
                asset, quantity, available
            );
            return Err(TradingError::InsufficientBalance {
                asset: asset.to_string(),
                required: quantity.clone(),
                available,
            });
        }

        info!("Placing market sell: {} {}", quantity, asset);
        let order = self.gateway.place_market_sell(asset, quantity).await.map_err(|e| {
            error!("Market sell of {} {} failed: {}", quantity, asset, e);
            e
        })?;
        self.await_order_completion(order).await
    }

    async fn balance_of(&self, asset: &str) -> TradingResult<BigDecimal> {
        let balances = self.gateway.get_portfolio().await?;
        Ok(balances
            .into_iter()
            .find(|p| p.name == asset)
            .map(|p| p.quantity)
            .unwrap_or_else(BigDecimal::zero))
    }

    /// Records `order`, then polls completed orders until it shows up.
    ///
    /// After `max_retries` misses the order is cancelled on the exchange and
    /// recorded as cancelled; that outcome is returned, not raised.
    pub async fn await_order_completion(&self, mut order: MarketOrder) -> TradingResult<MarketOrder> {
        self.save_order(&order).await?;

        let polling = &self.settings.order_polling;
        for attempt in 1..=polling.max_retries {
            let completed = self.gateway.get_completed_orders().await.map_err(|e| {
                error!("Failed to poll completed orders for {}: {}", order.id, e);
                e
            })?;

            if let Some(fill) = completed.into_iter().find(|o| o.id == order.id) {
                order.rate = fill.rate;
                order.amount = fill.amount;
                order.completion = fill.completion;
                info!(
                    "{} order {} for {} {} completed after {} poll(s)",
                    order.side, order.id, order.amount, order.coin, attempt
                );
                self.save_order(&order).await?;
                return Ok(order);
            }

            debug!(
                "Order {} not completed yet (attempt {}/{})",
                order.id, attempt, polling.max_retries
            );
            if attempt < polling.max_retries {
                tokio::time::sleep(polling.poll_interval).await;
            }
        }

        warn!(
            "Order {} not completed after {} polls, cancelling",
            order.id, polling.max_retries
        );
        let acknowledged = self.gateway.cancel_order(&order.id, order.side).await?;
        if !acknowledged {
            warn!("Exchange did not acknowledge cancellation of order {}", order.id);
        }
        order.mark_cancelled();
        self.save_order(&order).await?;
        Ok(order)
    }

    async fn save_order(&self, order: &MarketOrder) -> TradingResult<()> {
        let saved = self.stores.orders.save_order(order).await?;
        ensure_saved(saved, &format!("order {}", order.id))?;
        Ok(())
    }

    pub async fn append_log(&self, strategy: &str, message: &str) -> TradingResult<()> {
        let log = StrategyLog::new(strategy, message, self.clock.now());
        let saved = self.stores.logs.save_log(&log).await?;
        ensure_saved(saved, &format!("{} log", strategy))?;
        info!("{}: {}", strategy, message);
        Ok(())
    }

    pub async fn get_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TradingResult<Vec<StrategyLog>> {
        Ok(self.stores.logs.get_logs(from, to).await?)
    }

    pub async fn get_logs_by_strategy(
        &self,
        strategy: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TradingResult<Vec<StrategyLog>> {
        Ok(self.stores.logs.get_logs_by_strategy(strategy, from, to).await?)
    }

    pub async fn get_target_weightings(&self) -> TradingResult<Vec<TargetWeighting>> {
        Ok(self.stores.weightings.get_target_weightings().await?)
    }

    /// Replaces the stored target set.
    pub async fn save_target_weightings(&self, weightings: &[TargetWeighting]) -> TradingResult<()> {
        let saved = self.stores.weightings.save_target_weightings(weightings).await?;
        ensure_saved(saved, "target weightings")?;
        Ok(())
    }

    pub async fn save_daily_returns(&self, returns: &[DailyReturn]) -> TradingResult<()> {
        if returns.is_empty() {
            debug!("No daily returns to save");
            return Ok(());
        }
        let saved = self.stores.daily_returns.save_daily_returns(returns).await?;
        ensure_saved(saved, "daily returns")?;
        Ok(())
    }
}
