use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fraction of portfolio value the allocation wants in one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWeighting {
    pub exchange: String,
    pub name: String,
    pub weight: BigDecimal,
    pub timestamp: DateTime<Utc>,
}

impl TargetWeighting {
    pub fn new(
        exchange: impl Into<String>,
        name: impl Into<String>,
        weight: BigDecimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            name: name.into(),
            weight,
            timestamp,
        }
    }
}
