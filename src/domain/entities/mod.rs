pub mod daily_return;
pub mod order;
pub mod position;
pub mod price_snapshot;
pub mod strategy_log;
pub mod target_weighting;
