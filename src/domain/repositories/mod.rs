pub mod exchange_gateway;
pub mod stores;
