use super::{duration_until_next_boundary, Strategy};
use crate::application::services::portfolio_service::PortfolioService;
use crate::application::strategies::recalculate_weights;
use crate::domain::entities::order::{truncate_to_order_scale, OrderSide};
use crate::domain::entities::position::Portfolio;
use crate::domain::entities::price_snapshot::{latest_for, PriceSnapshot};
use crate::domain::entities::strategy_log::last_run;
use crate::domain::entities::target_weighting::TargetWeighting;
use crate::domain::errors::{TradingError, TradingResult};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const STRATEGY_NAME: &str = "RebalancePortfolioStrategy";
pub const REBALANCE_PORTFOLIO: &str = "Rebalance Portfolio";

/// One trade needed to move a holding toward its target weight.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceOrder {
    pub asset: String,
    pub side: OrderSide,
    /// Always non-negative.
    pub quantity: BigDecimal,
}

/// Trades that move `portfolio` onto `targets`, sells first.
///
/// Each target weight becomes a wanted quantity through the portfolio's total
/// value and the asset's latest `last` price; the order is the difference to
/// what is held. Positive differences buy; zero and negative ones sell, never
/// more than the holding. Quantities are cut down to the exchange's order
/// scale. Sells come before buys so their proceeds can fund the buys; within
/// each side target order is kept.
pub fn plan_rebalance(
    portfolio: &Portfolio,
    targets: &[TargetWeighting],
    prices: &[PriceSnapshot],
) -> TradingResult<Vec<RebalanceOrder>> {
    let total_value = portfolio.total_value();
    let mut sells = Vec::new();
    let mut buys = Vec::new();

    for target in targets {
        let price = latest_for(prices, &target.name)
            .map(|p| p.last.clone())
            .filter(|last| !last.is_zero())
            .ok_or_else(|| TradingError::PriceUnavailable(target.name.clone()))?;

        let held = portfolio.quantity_of(&target.name);
        let wanted = &target.weight * &total_value / price;
        let change = wanted - &held;

        if change > BigDecimal::zero() {
            buys.push(RebalanceOrder {
                asset: target.name.clone(),
                side: OrderSide::Buy,
                quantity: truncate_to_order_scale(&change),
            });
        } else {
            let excess = change.abs().min(held);
            sells.push(RebalanceOrder {
                asset: target.name.clone(),
                side: OrderSide::Sell,
                quantity: truncate_to_order_scale(&excess),
            });
        }
    }

    sells.extend(buys);
    Ok(sells)
}

/// Trades toward the latest target weights whenever they were recalculated
/// after the last rebalance.
pub struct RebalanceStrategy {
    service: Arc<PortfolioService>,
}

impl RebalanceStrategy {
    pub fn new(service: Arc<PortfolioService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Strategy for RebalanceStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn should_execute(&self) -> TradingResult<bool> {
        let now = self.service.clock().now();
        let day_ago = now - ChronoDuration::days(1);

        let rebalance_logs = self
            .service
            .get_logs_by_strategy(STRATEGY_NAME, day_ago, now)
            .await?;
        let last_rebalance = last_run(&rebalance_logs, REBALANCE_PORTFOLIO).unwrap_or(day_ago);

        let recalculation_logs = self
            .service
            .get_logs_by_strategy(recalculate_weights::STRATEGY_NAME, day_ago, now)
            .await?;
        let last_recalculation = last_run(
            &recalculation_logs,
            recalculate_weights::RECALCULATED_TARGET_WEIGHTS,
        )
        .unwrap_or(day_ago);

        Ok(last_rebalance < last_recalculation)
    }

    async fn handle_execute(&self) -> TradingResult<()> {
        let portfolio = self.service.get_portfolio().await?;
        let targets = self.service.get_target_weightings().await?;

        if targets.iter().all(|t| t.weight.is_zero()) {
            info!("No asset has a positive target weight, leaving portfolio unchanged");
        } else {
            let prices = self.service.get_current_prices().await?;
            let orders = plan_rebalance(&portfolio, &targets, &prices)?;

            for order in &orders {
                if order.quantity.is_zero() {
                    debug!("{} already at target weight", order.asset);
                    continue;
                }
                let placed = match order.side {
                    OrderSide::Buy => {
                        self.service
                            .place_market_buy(&order.asset, &order.quantity)
                            .await?
                    }
                    OrderSide::Sell => {
                        self.service
                            .place_market_sell(&order.asset, &order.quantity)
                            .await?
                    }
                };
                info!(
                    "{} {} {}: {}",
                    placed.side,
                    placed.amount,
                    placed.coin,
                    if placed.cancelled { "cancelled" } else { "filled" }
                );
            }
        }

        self.service.append_log(STRATEGY_NAME, REBALANCE_PORTFOLIO).await
    }

    fn sleep_duration(&self) -> Duration {
        duration_until_next_boundary(self.service.clock().now(), 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::position::Position;
    use chrono::{DateTime, TimeZone, Utc};
    use std::str::FromStr;

    fn dec(v: &str) -> BigDecimal {
        BigDecimal::from_str(v).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn target(name: &str, weight: &str) -> TargetWeighting {
        TargetWeighting::new("CoinSpot", name, dec(weight), now())
    }

    fn quote(name: &str, last: &str) -> PriceSnapshot {
        PriceSnapshot::new("CoinSpot", name, "AUD", dec(last), dec(last), dec(last), now())
    }

    #[test]
    fn test_plan_moves_value_between_assets() {
        // 1000 AUD total: BTC worth 750, ETH worth 250.
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![
                Position::new("CoinSpot", "BTC", dec("0.75"), dec("1000"), now()),
                Position::new("CoinSpot", "ETH", dec("2.5"), dec("100"), now()),
            ],
        );
        let targets = vec![target("BTC", "0.5"), target("ETH", "0.5")];
        let prices = vec![quote("BTC", "1000"), quote("ETH", "100")];

        let plan = plan_rebalance(&portfolio, &targets, &prices).unwrap();

        assert_eq!(
            plan,
            vec![
                RebalanceOrder {
                    asset: "BTC".to_string(),
                    side: OrderSide::Sell,
                    quantity: dec("0.25"),
                },
                RebalanceOrder {
                    asset: "ETH".to_string(),
                    side: OrderSide::Buy,
                    quantity: dec("2.5"),
                },
            ]
        );
    }

    #[test]
    fn test_plan_buys_asset_not_yet_held() {
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![Position::new("CoinSpot", "AUD", dec("300"), dec("1"), now())],
        );
        let targets = vec![target("XRP", "1")];
        let prices = vec![quote("XRP", "0.6")];

        let plan = plan_rebalance(&portfolio, &targets, &prices).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].side, OrderSide::Buy);
        assert_eq!(plan[0].quantity, dec("500"));
    }

    #[test]
    fn test_plan_treats_zero_delta_as_sell() {
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![Position::new("CoinSpot", "BTC", dec("1"), dec("100"), now())],
        );
        let plan = plan_rebalance(&portfolio, &[target("BTC", "1")], &[quote("BTC", "100")]).unwrap();

        assert_eq!(plan[0].side, OrderSide::Sell);
        assert!(plan[0].quantity.is_zero());
    }

    #[test]
    fn test_plan_full_exit_sells_exactly_the_holding() {
        // 1925.911 AUD total; BTC is 0.3 at 1234.57.
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![
                Position::new("CoinSpot", "AUD", dec("777.77"), dec("1"), now()),
                Position::new("CoinSpot", "BTC", dec("0.3"), dec("1234.57"), now()),
                Position::new("CoinSpot", "ETH", dec("1"), dec("777.77"), now()),
            ],
        );
        let targets = vec![target("BTC", "0"), target("ETH", "1")];
        let prices = vec![quote("BTC", "1234.57"), quote("ETH", "777.77")];

        let plan = plan_rebalance(&portfolio, &targets, &prices).unwrap();

        assert_eq!(plan[0].side, OrderSide::Sell);
        assert_eq!(plan[0].quantity, dec("0.3"));
        assert_eq!(plan[1].side, OrderSide::Buy);
        assert_eq!(plan[1].quantity, dec("1.47619604"));
    }

    #[test]
    fn test_plan_lists_sells_before_buys_and_truncates() {
        // 2844.96581492 AUD total.
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![
                Position::new("CoinSpot", "AUD", dec("100.01"), dec("1"), now()),
                Position::new("CoinSpot", "BTC", dec("0.123456"), dec("1234.57"), now()),
                Position::new("CoinSpot", "ETH", dec("3.3333"), dec("777.77"), now()),
            ],
        );
        let targets = vec![target("BTC", "0.5"), target("ETH", "0")];
        let prices = vec![quote("BTC", "1234.57"), quote("ETH", "777.77")];

        let plan = plan_rebalance(&portfolio, &targets, &prices).unwrap();

        assert_eq!(
            plan,
            vec![
                RebalanceOrder {
                    asset: "ETH".to_string(),
                    side: OrderSide::Sell,
                    quantity: dec("3.3333"),
                },
                RebalanceOrder {
                    asset: "BTC".to_string(),
                    side: OrderSide::Buy,
                    quantity: dec("1.02875319"),
                },
            ]
        );
    }

    #[test]
    fn test_plan_never_sells_more_than_held() {
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![
                Position::new("CoinSpot", "AUD", dec("100"), dec("1"), now()),
                Position::new("CoinSpot", "BTC", dec("0.123456"), dec("1000"), now()),
            ],
        );
        let plan = plan_rebalance(&portfolio, &[target("BTC", "-0.5")], &[quote("BTC", "1000")])
            .unwrap();

        assert_eq!(plan[0].side, OrderSide::Sell);
        assert_eq!(plan[0].quantity, dec("0.123456"));
    }

    #[test]
    fn test_plan_fails_without_quote() {
        let portfolio = Portfolio::new("CoinSpot", vec![]);
        let err = plan_rebalance(&portfolio, &[target("DOGE", "1")], &[]).unwrap_err();
        assert!(matches!(err, TradingError::PriceUnavailable(asset) if asset == "DOGE"));
    }
}
