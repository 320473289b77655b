//! Database Models
//!
//! Row shapes for the SQLite tables. Decimals are stored as TEXT so no
//! precision is lost on the way through; conversion back to domain
//! entities rejects anything that no longer parses.

use crate::domain::entities::daily_return::{DailyReturn, ReturnType};
use crate::domain::entities::order::{MarketOrder, OrderCompletion, OrderSide};
use crate::domain::entities::position::Position;
use crate::domain::entities::price_snapshot::PriceSnapshot;
use crate::domain::entities::strategy_log::StrategyLog;
use crate::domain::entities::target_weighting::TargetWeighting;
use crate::domain::errors::PersistenceError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

fn decimal(column: &str, value: &str) -> Result<BigDecimal, PersistenceError> {
    BigDecimal::from_str(value)
        .map_err(|e| PersistenceError::Corrupt(format!("{} '{}': {}", column, value, e)))
}

/// Price snapshot record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PriceSnapshotRecord {
    pub id: i64,
    pub exchange: String,
    pub name: String,
    pub currency: String,
    pub bid: String,
    pub ask: String,
    pub last: String,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<PriceSnapshotRecord> for PriceSnapshot {
    type Error = PersistenceError;

    fn try_from(r: PriceSnapshotRecord) -> Result<Self, Self::Error> {
        Ok(PriceSnapshot::new(
            r.exchange,
            r.name,
            r.currency,
            decimal("bid", &r.bid)?,
            decimal("ask", &r.ask)?,
            decimal("last", &r.last)?,
            r.timestamp,
        ))
    }
}

/// Position record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PositionRecord {
    pub id: i64,
    pub exchange: String,
    pub name: String,
    pub quantity: String,
    pub current_price: String,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<PositionRecord> for Position {
    type Error = PersistenceError;

    fn try_from(r: PositionRecord) -> Result<Self, Self::Error> {
        Ok(Position::new(
            r.exchange,
            r.name,
            decimal("quantity", &r.quantity)?,
            decimal("current_price", &r.current_price)?,
            r.timestamp,
        ))
    }
}

/// Strategy log record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StrategyLogRecord {
    pub id: i64,
    pub strategy: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<StrategyLogRecord> for StrategyLog {
    fn from(r: StrategyLogRecord) -> Self {
        StrategyLog {
            id: Some(r.id),
            strategy: r.strategy,
            message: r.message,
            timestamp: r.timestamp,
        }
    }
}

/// Target weighting record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TargetWeightingRecord {
    pub exchange: String,
    pub name: String,
    pub weight: String,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<TargetWeightingRecord> for TargetWeighting {
    type Error = PersistenceError;

    fn try_from(r: TargetWeightingRecord) -> Result<Self, Self::Error> {
        Ok(TargetWeighting::new(
            r.exchange,
            r.name,
            decimal("weight", &r.weight)?,
            r.timestamp,
        ))
    }
}

/// Daily return record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyReturnRecord {
    pub id: i64,
    pub exchange: String,
    pub name: String,
    pub return_type: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<DailyReturnRecord> for DailyReturn {
    type Error = PersistenceError;

    fn try_from(r: DailyReturnRecord) -> Result<Self, Self::Error> {
        let return_type = match r.return_type.as_str() {
            "Daily" => ReturnType::Daily,
            other => {
                return Err(PersistenceError::Corrupt(format!(
                    "return_type '{}'",
                    other
                )))
            }
        };
        Ok(DailyReturn {
            exchange: r.exchange,
            name: r.name,
            return_type,
            value: decimal("value", &r.value)?,
            timestamp: r.timestamp,
        })
    }
}

/// Market order record in database. Fill columns are NULL until completion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderRecord {
    pub id: String,
    pub exchange: String,
    pub side: String, // "BUY" or "SELL"
    pub coin: String,
    pub market: String,
    pub rate: String,
    pub amount: String,
    pub total: Option<String>,
    pub sold_date: Option<DateTime<Utc>>,
    pub fee: Option<String>,
    pub gst: Option<String>,
    pub aud_total: Option<String>,
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<&MarketOrder> for OrderRecord {
    fn from(o: &MarketOrder) -> Self {
        let fill = o.completion.as_ref();
        Self {
            id: o.id.clone(),
            exchange: o.exchange.clone(),
            side: o.side.to_string(),
            coin: o.coin.clone(),
            market: o.market.clone(),
            rate: o.rate.to_string(),
            amount: o.amount.to_string(),
            total: fill.map(|c| c.total.to_string()),
            sold_date: fill.map(|c| c.sold_date),
            fee: fill.map(|c| c.fee.to_string()),
            gst: fill.map(|c| c.gst.to_string()),
            aud_total: fill.map(|c| c.aud_total.to_string()),
            cancelled: o.cancelled,
            timestamp: o.timestamp,
        }
    }
}

impl TryFrom<OrderRecord> for MarketOrder {
    type Error = PersistenceError;

    fn try_from(r: OrderRecord) -> Result<Self, Self::Error> {
        let side = OrderSide::from_str(&r.side)
            .map_err(|_| PersistenceError::Corrupt(format!("side '{}'", r.side)))?;

        let completion = match (r.total, r.sold_date, r.fee, r.gst, r.aud_total) {
            (Some(total), Some(sold_date), Some(fee), Some(gst), Some(aud_total)) => {
                Some(OrderCompletion {
                    total: decimal("total", &total)?,
                    sold_date,
                    fee: decimal("fee", &fee)?,
                    gst: decimal("gst", &gst)?,
                    aud_total: decimal("aud_total", &aud_total)?,
                })
            }
            (None, None, None, None, None) => None,
            _ => {
                return Err(PersistenceError::Corrupt(format!(
                    "order {} has a partial fill record",
                    r.id
                )))
            }
        };

        Ok(MarketOrder {
            id: r.id,
            exchange: r.exchange,
            side,
            coin: r.coin,
            market: r.market,
            rate: decimal("rate", &r.rate)?,
            amount: decimal("amount", &r.amount)?,
            completion,
            cancelled: r.cancelled,
            timestamp: r.timestamp,
        })
    }
}
