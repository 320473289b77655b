use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quoted prices for one asset at one capture event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub exchange: String,
    pub name: String,
    pub currency: String,
    pub bid: BigDecimal,
    pub ask: BigDecimal,
    pub last: BigDecimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn new(
        exchange: impl Into<String>,
        name: impl Into<String>,
        currency: impl Into<String>,
        bid: BigDecimal,
        ask: BigDecimal,
        last: BigDecimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            name: name.into(),
            currency: currency.into(),
            bid,
            ask,
            last,
            timestamp,
        }
    }
}

/// Finds the most recent snapshot for `name` in a batch.
pub fn latest_for<'a>(snapshots: &'a [PriceSnapshot], name: &str) -> Option<&'a PriceSnapshot> {
    snapshots
        .iter()
        .filter(|s| s.name == name)
        .max_by_key(|s| s.timestamp)
}
