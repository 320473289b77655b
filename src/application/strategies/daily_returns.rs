use super::{due_after_a_day, start_of_day, Strategy};
use crate::application::services::portfolio_service::PortfolioService;
use crate::domain::entities::daily_return::{DailyReturn, ReturnType};
use crate::domain::entities::position::Portfolio;
use crate::domain::entities::price_snapshot::PriceSnapshot;
use crate::domain::errors::TradingResult;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, One, Zero};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const STRATEGY_NAME: &str = "CalculateDailyReturns";
pub const CALCULATED_RETURNS: &str = "Calculated Returns";

/// Records yesterday-to-now returns of every held asset once a day.
pub struct DailyReturnsStrategy {
    service: Arc<PortfolioService>,
}

impl DailyReturnsStrategy {
    pub fn new(service: Arc<PortfolioService>) -> Self {
        Self { service }
    }
}

/// `current / yesterday - 1` per position.
///
/// Yesterday's price is the earliest snapshot before `today`. Positions
/// without one, or with a zero price, are skipped.
pub fn calculate_daily_returns(
    portfolio: &Portfolio,
    daily_prices: &[PriceSnapshot],
    today: DateTime<Utc>,
    timestamp: DateTime<Utc>,
) -> Vec<DailyReturn> {
    let mut returns = Vec::new();
    for position in &portfolio.positions {
        let yesterday_price = daily_prices
            .iter()
            .filter(|p| p.name == position.name && p.timestamp < today)
            .min_by_key(|p| p.timestamp)
            .map(|p| p.last.clone())
            .unwrap_or_else(BigDecimal::zero);

        if yesterday_price.is_zero() {
            debug!("No price for {} yesterday, skipping", position.name);
            continue;
        }

        returns.push(DailyReturn {
            exchange: portfolio.exchange.clone(),
            name: position.name.clone(),
            return_type: ReturnType::Daily,
            value: &position.current_price / &yesterday_price - BigDecimal::one(),
            timestamp,
        });
    }
    returns
}

#[async_trait]
impl Strategy for DailyReturnsStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    async fn should_execute(&self) -> TradingResult<bool> {
        due_after_a_day(&self.service, STRATEGY_NAME, CALCULATED_RETURNS).await
    }

    async fn handle_execute(&self) -> TradingResult<()> {
        let now = self.service.clock().now();
        let today = start_of_day(now);
        let yesterday = today - ChronoDuration::days(1);

        let portfolio = self.service.get_portfolio().await?;
        let daily_prices = self.service.get_daily_prices(yesterday, today).await?;

        let returns = calculate_daily_returns(&portfolio, &daily_prices, today, now);
        info!("Calculated {} daily returns", returns.len());
        self.service.save_daily_returns(&returns).await?;

        self.service.append_log(STRATEGY_NAME, CALCULATED_RETURNS).await
    }

    fn sleep_duration(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::position::Position;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(v: &str) -> BigDecimal {
        BigDecimal::from_str(v).unwrap()
    }

    fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
    }

    fn price(name: &str, last: &str, at: DateTime<Utc>) -> PriceSnapshot {
        PriceSnapshot::new("CoinSpot", name, "AUD", dec(last), dec(last), dec(last), at)
    }

    #[test]
    fn test_daily_returns_use_earliest_price_of_yesterday() {
        let now = today() + ChronoDuration::hours(3);
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![
                Position::new("CoinSpot", "BTC", dec("1"), dec("110"), now),
                Position::new("CoinSpot", "ETH", dec("2"), dec("45"), now),
            ],
        );
        let yesterday = today() - ChronoDuration::days(1);
        let prices = vec![
            price("BTC", "105", yesterday + ChronoDuration::hours(6)),
            price("BTC", "100", yesterday),
            price("ETH", "50", yesterday),
        ];

        let returns = calculate_daily_returns(&portfolio, &prices, today(), now);

        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].name, "BTC");
        assert_eq!(returns[0].value, dec("0.1"));
        assert_eq!(returns[1].value, dec("-0.1"));
        assert!(returns.iter().all(|r| r.return_type == ReturnType::Daily));
    }

    #[test]
    fn test_daily_returns_skip_zero_and_missing_prices() {
        let now = today();
        let portfolio = Portfolio::new(
            "CoinSpot",
            vec![
                Position::new("CoinSpot", "BTC", dec("1"), dec("110"), now),
                Position::new("CoinSpot", "AUD", dec("500"), dec("1"), now),
                Position::new("CoinSpot", "XRP", dec("10"), dec("0.9"), now),
            ],
        );
        let prices = vec![
            price("BTC", "0", today() - ChronoDuration::days(1)),
            price("XRP", "0.75", today() - ChronoDuration::hours(20)),
        ];

        let returns = calculate_daily_returns(&portfolio, &prices, today(), now);

        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].name, "XRP");
        assert_eq!(returns[0].value, dec("0.2"));
    }
}
