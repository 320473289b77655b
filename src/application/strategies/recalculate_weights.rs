use super::{due_after_a_day, start_of_day, Strategy};
use crate::application::services::portfolio_service::PortfolioService;
use crate::domain::errors::TradingResult;
use crate::domain::services::forecasting::forecast_target_weights;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const STRATEGY_NAME: &str = "RecalculateTargetWeightsStrategy";
pub const RECALCULATED_TARGET_WEIGHTS: &str = "Recalculated Target Weights";

pub const DEFAULT_LOOKBACK_DAYS: u32 = 60;

/// Refits the return forecast over the lookback window once a day and
/// replaces the stored target weights.
pub struct RecalculateWeightsStrategy {
    service: Arc<PortfolioService>,
    lookback_days: u32,
}

impl RecalculateWeightsStrategy {
    pub fn new(service: Arc<PortfolioService>, lookback_days: u32) -> Self {
        Self {
            service,
            lookback_days,
        }
    }
}

#[async_trait]
impl Strategy for RecalculateWeightsStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn should_execute(&self) -> TradingResult<bool> {
        due_after_a_day(&self.service, STRATEGY_NAME, RECALCULATED_TARGET_WEIGHTS).await
    }

    async fn handle_execute(&self) -> TradingResult<()> {
        let now = self.service.clock().now();
        let to = start_of_day(now);
        let from = to - ChronoDuration::days(i64::from(self.lookback_days));

        let prices = self.service.get_daily_prices(from, to).await?;
        let weights = forecast_target_weights(&prices, self.service.exchange(), now)?;

        for weight in &weights {
            info!("Target weight for {}: {}", weight.name, weight.weight.round(4));
        }
        self.service.save_target_weightings(&weights).await?;

        self.service
            .append_log(STRATEGY_NAME, RECALCULATED_TARGET_WEIGHTS)
            .await
    }

    fn sleep_duration(&self) -> Duration {
        Duration::from_secs(10 * 60)
    }
}
