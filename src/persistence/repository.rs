//! Database Repository
//!
//! SQLite implementations of the store traits. Every `save_*` reports
//! `true` only when the expected rows were written.

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::daily_return::DailyReturn;
use crate::domain::entities::order::MarketOrder;
use crate::domain::entities::position::Position;
use crate::domain::entities::price_snapshot::PriceSnapshot;
use crate::domain::entities::strategy_log::StrategyLog;
use crate::domain::entities::target_weighting::TargetWeighting;
use crate::domain::errors::PersistenceError;
use crate::domain::repositories::stores::{
    DailyReturnStore, OrderStore, PositionStore, PriceSnapshotStore, StoreResult,
    StrategyLogStore, TargetWeightingStore,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use tracing::{debug, error};

fn query_error(what: &str, e: sqlx::Error) -> PersistenceError {
    error!("Failed to {}: {}", what, e);
    DatabaseError::QueryError(format!("Failed to {}: {}", what, e)).into()
}

fn convert_all<R, T>(records: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = PersistenceError>,
{
    records.into_iter().map(T::try_from).collect()
}

/// Keeps the first snapshot seen for each asset on each UTC day.
/// Input must be ordered by timestamp.
fn earliest_per_day(snapshots: Vec<PriceSnapshot>) -> Vec<PriceSnapshot> {
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
    snapshots
        .into_iter()
        .filter(|s| seen.insert((s.name.clone(), s.timestamp.date_naive())))
        .collect()
}

/// Price snapshot repository
pub struct SqlitePriceSnapshotRepository {
    pool: DbPool,
}

impl SqlitePriceSnapshotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceSnapshotStore for SqlitePriceSnapshotRepository {
    async fn save_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> StoreResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("begin snapshot batch", e))?;

        let mut written = 0u64;
        for s in snapshots {
            written += sqlx::query(
                r#"
                INSERT INTO price_snapshots (exchange, name, currency, bid, ask, last, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&s.exchange)
            .bind(&s.name)
            .bind(&s.currency)
            .bind(s.bid.to_string())
            .bind(s.ask.to_string())
            .bind(s.last.to_string())
            .bind(s.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("insert price snapshot", e))?
            .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| query_error("commit snapshot batch", e))?;

        debug!("Saved {} price snapshots", written);
        Ok(written == snapshots.len() as u64 && written > 0)
    }

    async fn get_price_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PriceSnapshot>> {
        let records = sqlx::query_as::<_, PriceSnapshotRecord>(
            r#"
            SELECT * FROM price_snapshots
            WHERE timestamp >= ?1 AND timestamp <= ?2
            ORDER BY timestamp, name
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get price snapshots", e))?;

        convert_all(records)
    }

    async fn get_daily_price_snapshots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<PriceSnapshot>> {
        let records = sqlx::query_as::<_, PriceSnapshotRecord>(
            r#"
            SELECT * FROM price_snapshots
            WHERE timestamp >= ?1 AND timestamp < ?2
            ORDER BY timestamp, id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get daily price snapshots", e))?;

        Ok(earliest_per_day(convert_all(records)?))
    }
}

/// Position repository
pub struct SqlitePositionRepository {
    pool: DbPool,
}

impl SqlitePositionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionStore for SqlitePositionRepository {
    async fn save_positions(&self, positions: &[Position]) -> StoreResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("begin position batch", e))?;

        let mut written = 0u64;
        for p in positions {
            written += sqlx::query(
                r#"
                INSERT INTO positions (exchange, name, quantity, current_price, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&p.exchange)
            .bind(&p.name)
            .bind(p.quantity.to_string())
            .bind(p.current_price.to_string())
            .bind(p.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("insert position", e))?
            .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| query_error("commit position batch", e))?;

        debug!("Saved {} positions", written);
        Ok(written == positions.len() as u64 && written > 0)
    }

    async fn get_positions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Position>> {
        let records = sqlx::query_as::<_, PositionRecord>(
            "SELECT * FROM positions WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp, name",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get positions", e))?;

        convert_all(records)
    }
}

/// Strategy log repository
pub struct SqliteStrategyLogRepository {
    pool: DbPool,
}

impl SqliteStrategyLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StrategyLogStore for SqliteStrategyLogRepository {
    async fn save_log(&self, log: &StrategyLog) -> StoreResult<bool> {
        let rows = sqlx::query(
            "INSERT INTO strategy_logs (strategy, message, timestamp) VALUES (?1, ?2, ?3)",
        )
        .bind(&log.strategy)
        .bind(&log.message)
        .bind(log.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("insert strategy log", e))?
        .rows_affected();

        debug!("Logged {}: {}", log.strategy, log.message);
        Ok(rows == 1)
    }

    async fn get_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StrategyLog>> {
        let records = sqlx::query_as::<_, StrategyLogRecord>(
            "SELECT * FROM strategy_logs WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp, id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get strategy logs", e))?;

        Ok(records.into_iter().map(StrategyLog::from).collect())
    }

    async fn get_logs_by_strategy(
        &self,
        strategy: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<StrategyLog>> {
        let records = sqlx::query_as::<_, StrategyLogRecord>(
            r#"
            SELECT * FROM strategy_logs
            WHERE strategy = ?1 AND timestamp >= ?2 AND timestamp <= ?3
            ORDER BY timestamp, id
            "#,
        )
        .bind(strategy)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get strategy logs", e))?;

        Ok(records.into_iter().map(StrategyLog::from).collect())
    }
}

/// Target weighting repository
pub struct SqliteTargetWeightingRepository {
    pool: DbPool,
}

impl SqliteTargetWeightingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetWeightingStore for SqliteTargetWeightingRepository {
    async fn save_target_weightings(&self, weightings: &[TargetWeighting]) -> StoreResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("begin target weighting replace", e))?;

        sqlx::query("DELETE FROM target_weightings")
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("clear target weightings", e))?;

        let mut written = 0u64;
        for w in weightings {
            written += sqlx::query(
                r#"
                INSERT INTO target_weightings (exchange, name, weight, timestamp)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(exchange, name) DO UPDATE SET
                    weight = excluded.weight,
                    timestamp = excluded.timestamp
                "#,
            )
            .bind(&w.exchange)
            .bind(&w.name)
            .bind(w.weight.to_string())
            .bind(w.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("insert target weighting", e))?
            .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| query_error("commit target weightings", e))?;

        debug!("Replaced target weightings with {} entries", written);
        Ok(written == weightings.len() as u64)
    }

    async fn get_target_weightings(&self) -> StoreResult<Vec<TargetWeighting>> {
        let records = sqlx::query_as::<_, TargetWeightingRecord>(
            "SELECT * FROM target_weightings ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get target weightings", e))?;

        convert_all(records)
    }
}

/// Daily return repository
pub struct SqliteDailyReturnRepository {
    pool: DbPool,
}

impl SqliteDailyReturnRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DailyReturnStore for SqliteDailyReturnRepository {
    async fn save_daily_returns(&self, returns: &[DailyReturn]) -> StoreResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("begin daily return batch", e))?;

        let mut written = 0u64;
        for r in returns {
            written += sqlx::query(
                r#"
                INSERT INTO daily_returns (exchange, name, return_type, value, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&r.exchange)
            .bind(&r.name)
            .bind(r.return_type.to_string())
            .bind(r.value.to_string())
            .bind(r.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("insert daily return", e))?
            .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| query_error("commit daily returns", e))?;

        debug!("Saved {} daily returns", written);
        Ok(written == returns.len() as u64 && written > 0)
    }

    async fn get_daily_returns(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<DailyReturn>> {
        let records = sqlx::query_as::<_, DailyReturnRecord>(
            "SELECT * FROM daily_returns WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp, name",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get daily returns", e))?;

        convert_all(records)
    }
}

/// Order repository
pub struct SqliteOrderRepository {
    pool: DbPool,
}

impl SqliteOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqliteOrderRepository {
    async fn save_order(&self, order: &MarketOrder) -> StoreResult<bool> {
        let record = OrderRecord::from(order);
        let rows = sqlx::query(
            r#"
            INSERT INTO orders (
                id, exchange, side, coin, market, rate, amount,
                total, sold_date, fee, gst, aud_total, cancelled, timestamp
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                rate = excluded.rate,
                amount = excluded.amount,
                total = excluded.total,
                sold_date = excluded.sold_date,
                fee = excluded.fee,
                gst = excluded.gst,
                aud_total = excluded.aud_total,
                cancelled = excluded.cancelled
            "#,
        )
        .bind(&record.id)
        .bind(&record.exchange)
        .bind(&record.side)
        .bind(&record.coin)
        .bind(&record.market)
        .bind(&record.rate)
        .bind(&record.amount)
        .bind(&record.total)
        .bind(record.sold_date)
        .bind(&record.fee)
        .bind(&record.gst)
        .bind(&record.aud_total)
        .bind(record.cancelled)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("save order", e))?
        .rows_affected();

        debug!("Saved order {} ({:?})", order.id, order.status());
        Ok(rows == 1)
    }

    async fn get_orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<MarketOrder>> {
        let records = sqlx::query_as::<_, OrderRecord>(
            "SELECT * FROM orders WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp, id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("get orders", e))?;

        convert_all(records)
    }
}
