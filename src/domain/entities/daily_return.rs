use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnType {
    Daily,
}

impl std::fmt::Display for ReturnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnType::Daily => write!(f, "Daily"),
        }
    }
}

/// Simple return of one held asset over one period, e.g. `0.05` for +5%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReturn {
    pub exchange: String,
    pub name: String,
    pub return_type: ReturnType,
    pub value: BigDecimal,
    pub timestamp: DateTime<Utc>,
}
