use super::{duration_until_next_boundary, Strategy};
use crate::application::services::portfolio_service::PortfolioService;
use crate::domain::errors::TradingResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const STRATEGY_NAME: &str = "GetPriceSnapshots";
pub const GET_SNAPSHOTS: &str = "Get Snapshots";

/// Captures a price snapshot batch on every 5-minute boundary.
pub struct CaptureStrategy {
    service: Arc<PortfolioService>,
}

impl CaptureStrategy {
    pub fn new(service: Arc<PortfolioService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Strategy for CaptureStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn should_execute(&self) -> TradingResult<bool> {
        Ok(true)
    }

    async fn handle_execute(&self) -> TradingResult<()> {
        let snapshots = self.service.get_price_snapshots().await?;
        info!("Captured {} price snapshots", snapshots.len());
        self.service.append_log(STRATEGY_NAME, GET_SNAPSHOTS).await
    }

    fn sleep_duration(&self) -> Duration {
        duration_until_next_boundary(self.service.clock().now(), 5)
    }
}
