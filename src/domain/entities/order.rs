use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decimal places the exchange accepts for order amounts and rates.
pub const ORDER_SCALE: i64 = 8;

/// Cuts `value` toward zero at `ORDER_SCALE`, dropping trailing zeros.
pub fn truncate_to_order_scale(value: &BigDecimal) -> BigDecimal {
    value
        .with_scale_round(ORDER_SCALE, RoundingMode::Down)
        .normalized()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(format!("Unknown order side: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Completed,
}

/// Fill details reported by the exchange once a market order has executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletion {
    pub total: BigDecimal,
    pub sold_date: DateTime<Utc>,
    pub fee: BigDecimal,
    pub gst: BigDecimal,
    pub aud_total: BigDecimal,
}

/// A market order placed on the exchange.
///
/// Orders are never deleted: a fill is recorded by populating `completion`,
/// a timeout by setting `cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub id: String,
    pub exchange: String,
    pub side: OrderSide,
    pub coin: String,
    pub market: String,
    pub rate: BigDecimal,
    pub amount: BigDecimal,
    pub completion: Option<OrderCompletion>,
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

impl MarketOrder {
    pub fn status(&self) -> OrderStatus {
        match self.completion {
            Some(_) => OrderStatus::Completed,
            None => OrderStatus::Pending,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status() == OrderStatus::Completed
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }
}
