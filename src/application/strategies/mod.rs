//! Strategy state machines.
//!
//! Every strategy answers three questions for the scheduler: should it run
//! now, what does a run do, and how long to sleep before asking again.
//! Run history lives in the strategy log, so gates are computed from the
//! newest matching log entry rather than from in-memory state.

pub mod capture;
pub mod daily_returns;
pub mod rebalance;
pub mod recalculate_weights;

use crate::application::services::portfolio_service::PortfolioService;
use crate::domain::entities::strategy_log::last_run;
use crate::domain::errors::TradingResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Timelike, Utc};
use std::time::Duration;

pub use capture::CaptureStrategy;
pub use daily_returns::DailyReturnsStrategy;
pub use rebalance::RebalanceStrategy;
pub use recalculate_weights::RecalculateWeightsStrategy;

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name the strategy logs its runs under.
    fn name(&self) -> &'static str;

    async fn should_execute(&self) -> TradingResult<bool>;

    async fn handle_execute(&self) -> TradingResult<()>;

    fn sleep_duration(&self) -> Duration;
}

/// Midnight UTC at the start of `now`'s day.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::default()))
}

/// Time left until the next wall-clock multiple of `minutes` (UTC).
///
/// On an exact boundary the full period is returned.
pub fn duration_until_next_boundary(now: DateTime<Utc>, minutes: u32) -> Duration {
    let period = u64::from(minutes.max(1)) * 60;
    let into_period = u64::from(now.num_seconds_from_midnight()) % period;
    let nanos = u64::from(now.nanosecond().min(999_999_999));
    Duration::from_secs(period - into_period) - Duration::from_nanos(nanos)
}

/// True when `strategy` has not logged `message` within the last 24 hours.
pub(crate) async fn due_after_a_day(
    service: &PortfolioService,
    strategy: &str,
    message: &str,
) -> TradingResult<bool> {
    let now = service.clock().now();
    let day_ago = now - ChronoDuration::days(1);
    let logs = service.get_logs_by_strategy(strategy, day_ago, now).await?;
    let last = last_run(&logs, message).unwrap_or(day_ago);
    Ok(last <= day_ago)
}
