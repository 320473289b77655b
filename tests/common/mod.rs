//! Test doubles shared by the integration suites: a scripted exchange
//! gateway and an in-memory implementation of every store.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rebalance_bot::application::services::portfolio_service::{
    OrderPollingConfig, PortfolioService, ServiceSettings, Stores,
};
use rebalance_bot::domain::clock::FixedClock;
use rebalance_bot::domain::entities::daily_return::DailyReturn;
use rebalance_bot::domain::entities::order::{MarketOrder, OrderCompletion, OrderSide};
use rebalance_bot::domain::entities::position::Position;
use rebalance_bot::domain::entities::price_snapshot::PriceSnapshot;
use rebalance_bot::domain::entities::strategy_log::StrategyLog;
use rebalance_bot::domain::entities::target_weighting::TargetWeighting;
use rebalance_bot::domain::errors::ExchangeError;
use rebalance_bot::domain::repositories::exchange_gateway::{ExchangeGateway, ExchangeResult};
use rebalance_bot::domain::repositories::stores::{
    DailyReturnStore, OrderStore, PositionStore, PriceSnapshotStore, StoreResult,
    StrategyLogStore, TargetWeightingStore,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap()
}

pub fn quote(name: &str, bid: &str, ask: &str, last: &str) -> PriceSnapshot {
    PriceSnapshot::new("CoinSpot", name, "AUD", dec(bid), dec(ask), dec(last), noon())
}

pub fn balance(name: &str, quantity: &str) -> Position {
    Position::new("CoinSpot", name, dec(quantity), BigDecimal::from(0), noon())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub side: OrderSide,
    pub asset: String,
    pub quantity: BigDecimal,
}

/// Exchange double. Placed orders settle against `balances` at the quoted
/// rate straight away and show up as completed from poll number
/// `complete_on_poll` onwards; `None` means they never complete.
pub struct MockGateway {
    pub quotes: Mutex<Vec<PriceSnapshot>>,
    pub balances: Mutex<Vec<Position>>,
    pub complete_on_poll: Mutex<Option<usize>>,
    pub polls: AtomicUsize,
    pub placed: Mutex<Vec<PlacedOrder>>,
    pub cancelled: Mutex<Vec<(String, OrderSide)>>,
    pub fail_prices: AtomicBool,
    orders: Mutex<Vec<MarketOrder>>,
}

impl MockGateway {
    pub fn new(quotes: Vec<PriceSnapshot>, balances: Vec<Position>) -> Self {
        Self {
            quotes: Mutex::new(quotes),
            balances: Mutex::new(balances),
            complete_on_poll: Mutex::new(Some(1)),
            polls: AtomicUsize::new(0),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_prices: AtomicBool::new(false),
            orders: Mutex::new(Vec::new()),
        }
    }

    pub fn never_complete(&self) {
        *self.complete_on_poll.lock().unwrap() = None;
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.placed.lock().unwrap().clone()
    }

    fn place(&self, side: OrderSide, asset: &str, quantity: &BigDecimal) -> MarketOrder {
        let quotes = self.quotes.lock().unwrap();
        let rate = quotes
            .iter()
            .find(|q| q.name == asset)
            .map(|q| match side {
                OrderSide::Buy => q.ask.clone(),
                OrderSide::Sell => q.bid.clone(),
            })
            .unwrap_or_else(|| BigDecimal::from(0));

        let mut orders = self.orders.lock().unwrap();
        let order = MarketOrder {
            id: format!("order-{}", orders.len() + 1),
            exchange: "CoinSpot".to_string(),
            side,
            coin: asset.to_string(),
            market: format!("{}/AUD", asset),
            rate,
            amount: quantity.clone(),
            completion: None,
            cancelled: false,
            timestamp: noon(),
        };
        orders.push(order.clone());
        self.settle(side, asset, quantity, &order.rate);
        self.placed.lock().unwrap().push(PlacedOrder {
            side,
            asset: asset.to_string(),
            quantity: quantity.clone(),
        });
        order
    }

    fn settle(&self, side: OrderSide, asset: &str, quantity: &BigDecimal, rate: &BigDecimal) {
        let cost = quantity * rate;
        let (asset_change, cash_change) = match side {
            OrderSide::Buy => (quantity.clone(), -cost),
            OrderSide::Sell => (-quantity.clone(), cost),
        };

        let mut balances = self.balances.lock().unwrap();
        for (name, change) in [(asset, asset_change), ("AUD", cash_change)] {
            match balances.iter_mut().find(|b| b.name == name) {
                Some(held) => held.quantity = &held.quantity + change,
                None => {
                    let mut opened = balance(name, "0");
                    opened.quantity = change;
                    balances.push(opened);
                }
            }
        }
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn get_price_snapshots(&self) -> ExchangeResult<Vec<PriceSnapshot>> {
        if self.fail_prices.load(Ordering::SeqCst) {
            return Err(ExchangeError::Network("connection refused".to_string()));
        }
        Ok(self.quotes.lock().unwrap().clone())
    }

    async fn get_portfolio(&self) -> ExchangeResult<Vec<Position>> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn place_market_buy(
        &self,
        asset: &str,
        quantity: &BigDecimal,
    ) -> ExchangeResult<MarketOrder> {
        Ok(self.place(OrderSide::Buy, asset, quantity))
    }

    async fn place_market_sell(
        &self,
        asset: &str,
        quantity: &BigDecimal,
    ) -> ExchangeResult<MarketOrder> {
        Ok(self.place(OrderSide::Sell, asset, quantity))
    }

    async fn get_completed_orders(&self) -> ExchangeResult<Vec<MarketOrder>> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let complete = match *self.complete_on_poll.lock().unwrap() {
            Some(n) => poll >= n,
            None => false,
        };
        if !complete {
            return Ok(Vec::new());
        }

        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .map(|o| {
                let mut filled = o.clone();
                filled.rate = &o.rate + BigDecimal::from(1);
                filled.completion = Some(OrderCompletion {
                    total: &filled.rate * &o.amount,
                    sold_date: noon(),
                    fee: dec("1.5"),
                    gst: dec("0.15"),
                    aud_total: &filled.rate * &o.amount + dec("1.65"),
                });
                filled
            })
            .collect())
    }

    async fn cancel_order(&self, id: &str, side: OrderSide) -> ExchangeResult<bool> {
        self.cancelled.lock().unwrap().push((id.to_string(), side));
        Ok(true)
    }
}

/// Every store in one struct, backed by vectors.
pub struct MemoryStores {
    pub accept_writes: AtomicBool,
    pub snapshots: Mutex<Vec<PriceSnapshot>>,
    pub positions: Mutex<Vec<Position>>,
    pub logs: Mutex<Vec<StrategyLog>>,
    pub weightings: Mutex<Vec<TargetWeighting>>,
    pub daily_returns: Mutex<Vec<DailyReturn>>,
    pub order_writes: Mutex<Vec<MarketOrder>>,
    pub weighting_saves: AtomicUsize,
    order_write_attempts: AtomicUsize,
    reject_order_writes_from: AtomicUsize,
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self {
            accept_writes: AtomicBool::new(true),
            snapshots: Mutex::new(Vec::new()),
            positions: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            weightings: Mutex::new(Vec::new()),
            daily_returns: Mutex::new(Vec::new()),
            order_writes: Mutex::new(Vec::new()),
            weighting_saves: AtomicUsize::new(0),
            order_write_attempts: AtomicUsize::new(0),
            reject_order_writes_from: AtomicUsize::new(usize::MAX),
        }
    }
}

impl MemoryStores {
    pub fn reject_writes(&self) {
        self.accept_writes.store(false, Ordering::SeqCst);
    }

    /// Order writes number from 1; write `n` and every later one is rejected.
    pub fn reject_order_writes_from(&self, n: usize) {
        self.reject_order_writes_from.store(n, Ordering::SeqCst);
    }

    fn accepting(&self) -> bool {
        self.accept_writes.load(Ordering::SeqCst)
    }

    pub fn logs(&self) -> Vec<StrategyLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn order_writes(&self) -> Vec<MarketOrder> {
        self.order_writes.lock().unwrap().clone()
    }

    pub fn add_log(&self, strategy: &str, message: &str, at: DateTime<Utc>) {
        self.logs
            .lock()
            .unwrap()
            .push(StrategyLog::new(strategy, message, at));
    }

    pub fn as_stores(self: &Arc<Self>) -> Stores {
        Stores {
            positions: self.clone(),
            prices: self.clone(),
            logs: self.clone(),
            weightings: self.clone(),
            daily_returns: self.clone(),
            orders: self.clone(),
        }
    }
}

fn within(ts: DateTime<Utc>, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    ts >= from && ts <= to
}

#[async_trait]
impl PriceSnapshotStore for MemoryStores {
    async fn save_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> StoreResult<bool> {
        if !self.accepting() {
            return Ok(false);
        }
        self.snapshots.lock().unwrap().extend_from_slice(snapshots);
        Ok(true)
    }

    async fn get_price_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PriceSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| within(s.timestamp, from, to))
            .cloned()
            .collect())
    }

    async fn get_daily_price_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PriceSnapshot>> {
        let mut in_range: Vec<PriceSnapshot> = self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.timestamp >= from && s.timestamp < to)
            .cloned()
            .collect();
        in_range.sort_by_key(|s| s.timestamp);

        let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
        Ok(in_range
            .into_iter()
            .filter(|s| seen.insert((s.name.clone(), s.timestamp.date_naive())))
            .collect())
    }
}

#[async_trait]
impl PositionStore for MemoryStores {
    async fn save_positions(&self, positions: &[Position]) -> StoreResult<bool> {
        if !self.accepting() {
            return Ok(false);
        }
        self.positions.lock().unwrap().extend_from_slice(positions);
        Ok(true)
    }

    async fn get_positions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| within(p.timestamp, from, to))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StrategyLogStore for MemoryStores {
    async fn save_log(&self, log: &StrategyLog) -> StoreResult<bool> {
        if !self.accepting() {
            return Ok(false);
        }
        self.logs.lock().unwrap().push(log.clone());
        Ok(true)
    }

    async fn get_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StrategyLog>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| within(l.timestamp, from, to))
            .cloned()
            .collect())
    }

    async fn get_logs_by_strategy(
        &self,
        strategy: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StrategyLog>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.strategy == strategy && within(l.timestamp, from, to))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TargetWeightingStore for MemoryStores {
    async fn save_target_weightings(&self, weightings: &[TargetWeighting]) -> StoreResult<bool> {
        if !self.accepting() {
            return Ok(false);
        }
        self.weighting_saves.fetch_add(1, Ordering::SeqCst);
        *self.weightings.lock().unwrap() = weightings.to_vec();
        Ok(true)
    }

    async fn get_target_weightings(&self) -> StoreResult<Vec<TargetWeighting>> {
        Ok(self.weightings.lock().unwrap().clone())
    }
}

#[async_trait]
impl DailyReturnStore for MemoryStores {
    async fn save_daily_returns(&self, returns: &[DailyReturn]) -> StoreResult<bool> {
        if !self.accepting() {
            return Ok(false);
        }
        self.daily_returns.lock().unwrap().extend_from_slice(returns);
        Ok(true)
    }

    async fn get_daily_returns(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<DailyReturn>> {
        Ok(self
            .daily_returns
            .lock()
            .unwrap()
            .iter()
            .filter(|r| within(r.timestamp, from, to))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStores {
    async fn save_order(&self, order: &MarketOrder) -> StoreResult<bool> {
        let attempt = self.order_write_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.accepting() || attempt >= self.reject_order_writes_from.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.order_writes.lock().unwrap().push(order.clone());
        Ok(true)
    }

    async fn get_orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<MarketOrder>> {
        Ok(self
            .order_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|o| within(o.timestamp, from, to))
            .cloned()
            .collect())
    }
}

/// Everything a test needs to drive the service and inspect the effects.
pub struct Harness {
    pub gateway: Arc<MockGateway>,
    pub stores: Arc<MemoryStores>,
    pub clock: Arc<FixedClock>,
    pub service: Arc<PortfolioService>,
}

pub fn harness(quotes: Vec<PriceSnapshot>, balances: Vec<Position>) -> Harness {
    let gateway = Arc::new(MockGateway::new(quotes, balances));
    let stores = Arc::new(MemoryStores::default());
    let clock = Arc::new(FixedClock::new(noon()));
    let settings = ServiceSettings {
        tracked_assets: Vec::new(),
        order_polling: OrderPollingConfig {
            max_retries: 10,
            poll_interval: Duration::from_millis(1),
        },
        ..ServiceSettings::default()
    };
    let service = Arc::new(PortfolioService::new(
        gateway.clone(),
        stores.as_stores(),
        clock.clone(),
        settings,
    ));
    Harness {
        gateway,
        stores,
        clock,
        service,
    }
}
