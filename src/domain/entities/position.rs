use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Holding of one asset at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub exchange: String,
    pub name: String,
    pub quantity: BigDecimal,
    pub current_price: BigDecimal,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(
        exchange: impl Into<String>,
        name: impl Into<String>,
        quantity: BigDecimal,
        current_price: BigDecimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            name: name.into(),
            quantity,
            current_price,
            timestamp,
        }
    }

    pub fn value(&self) -> BigDecimal {
        &self.quantity * &self.current_price
    }
}

/// Derived view over the positions held on one exchange. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub exchange: String,
    pub positions: Vec<Position>,
}

impl Portfolio {
    pub fn new(exchange: impl Into<String>, positions: Vec<Position>) -> Self {
        Self {
            exchange: exchange.into(),
            positions,
        }
    }

    pub fn total_value(&self) -> BigDecimal {
        self.positions
            .iter()
            .fold(BigDecimal::zero(), |acc, p| acc + p.value())
    }

    pub fn position(&self, name: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.name == name)
    }

    /// Quantity held of `name`, zero when absent.
    pub fn quantity_of(&self, name: &str) -> BigDecimal {
        self.position(name)
            .map(|p| p.quantity.clone())
            .unwrap_or_else(BigDecimal::zero)
    }

    /// Fraction of total value held in `name`. Zero for an absent asset or an empty portfolio.
    pub fn weight_of(&self, name: &str) -> BigDecimal {
        let total = self.total_value();
        if total.is_zero() {
            return BigDecimal::zero();
        }
        match self.position(name) {
            Some(position) => position.value() / total,
            None => BigDecimal::zero(),
        }
    }
}
