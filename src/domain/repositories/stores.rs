//! Persistence collaborator traits.
//!
//! `save_*` returns `Ok(false)` when the store accepted the call but wrote
//! nothing; callers treat that as fatal. `Err` is reserved for unexpected
//! failures of the backing store.

use crate::domain::entities::daily_return::DailyReturn;
use crate::domain::entities::order::MarketOrder;
use crate::domain::entities::position::Position;
use crate::domain::entities::price_snapshot::PriceSnapshot;
use crate::domain::entities::strategy_log::StrategyLog;
use crate::domain::entities::target_weighting::TargetWeighting;
use crate::domain::errors::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, PersistenceError>;

#[async_trait]
pub trait PriceSnapshotStore: Send + Sync {
    async fn save_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> StoreResult<bool>;

    async fn get_price_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PriceSnapshot>>;

    /// Earliest snapshot per asset per UTC day within `[from, to)`.
    async fn get_daily_price_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PriceSnapshot>>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn save_positions(&self, positions: &[Position]) -> StoreResult<bool>;

    async fn get_positions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Position>>;
}

#[async_trait]
pub trait StrategyLogStore: Send + Sync {
    async fn save_log(&self, log: &StrategyLog) -> StoreResult<bool>;

    async fn get_logs(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> StoreResult<Vec<StrategyLog>>;

    async fn get_logs_by_strategy(
        &self,
        strategy: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StrategyLog>>;
}

#[async_trait]
pub trait TargetWeightingStore: Send + Sync {
    /// Replaces the whole stored set.
    async fn save_target_weightings(&self, weightings: &[TargetWeighting]) -> StoreResult<bool>;

    async fn get_target_weightings(&self) -> StoreResult<Vec<TargetWeighting>>;
}

#[async_trait]
pub trait DailyReturnStore: Send + Sync {
    async fn save_daily_returns(&self, returns: &[DailyReturn]) -> StoreResult<bool>;

    async fn get_daily_returns(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<DailyReturn>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts or updates the order keyed by its exchange id.
    async fn save_order(&self, order: &MarketOrder) -> StoreResult<bool>;

    async fn get_orders(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> StoreResult<Vec<MarketOrder>>;
}
