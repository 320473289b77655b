//! Exchange Gateway Trait
//!
//! The core talks to a single exchange only through `ExchangeGateway`.
//! Implementations normalize the exchange's responses into the domain
//! entities and report any non-success status as an `ExchangeError`.

use crate::domain::entities::order::{MarketOrder, OrderSide};
use crate::domain::entities::position::Position;
use crate::domain::entities::price_snapshot::PriceSnapshot;
use crate::domain::errors::ExchangeError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Current bid/ask/last for every listed asset.
    async fn get_price_snapshots(&self) -> ExchangeResult<Vec<PriceSnapshot>>;

    /// Account balances, priced at the exchange's indicative rate.
    /// An empty list means no holdings.
    async fn get_portfolio(&self) -> ExchangeResult<Vec<Position>>;

    /// Submits a market buy at the current ask. Returns the pending order.
    async fn place_market_buy(&self, asset: &str, quantity: &BigDecimal)
        -> ExchangeResult<MarketOrder>;

    /// Submits a market sell at the current bid. Returns the pending order.
    async fn place_market_sell(&self, asset: &str, quantity: &BigDecimal)
        -> ExchangeResult<MarketOrder>;

    /// Recently completed orders, with fill details populated.
    async fn get_completed_orders(&self) -> ExchangeResult<Vec<MarketOrder>>;

    async fn cancel_order(&self, id: &str, side: OrderSide) -> ExchangeResult<bool>;
}
