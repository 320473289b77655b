use crate::application::services::portfolio_service::{
    OrderPollingConfig, ServiceSettings, MAX_RETRIES, POLL_INTERVAL,
};
use crate::application::strategies::recalculate_weights::DEFAULT_LOOKBACK_DAYS;
use crate::infrastructure::coinspot_client::CoinSpotConfig;
use crate::persistence::DatabaseConfig;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://www.coinspot.com.au";
const DEFAULT_EXCHANGE: &str = "CoinSpot";
const DEFAULT_QUOTE_CURRENCY: &str = "AUD";
const DEFAULT_TRACKED_ASSETS: &[&str] = &["BTC", "ETH", "XRP"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
}

/// Everything the bot reads from its environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub exchange: String,
    pub quote_currency: String,
    pub tracked_assets: Vec<String>,
    pub database: DatabaseConfig,
    pub lookback_days: u32,
    pub order_max_retries: u32,
    pub order_poll_interval: Duration,
}

/// Parses `name` and keeps it only when it falls in `range`; anything else
/// falls back to `default` with a warning.
fn ranged<T, F>(lookup: &F, name: &str, range: RangeInclusive<T>, default: T) -> T
where
    T: FromStr + PartialOrd + Display + Copy,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {} (must be between {} and {}), using default: {}",
                name,
                value,
                range.start(),
                range.end(),
                default
            );
            default
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                name,
                raw,
                e,
                default
            );
            default
        }
    }
}

fn text<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn tracked_assets<F>(lookup: &F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let parsed: Vec<String> = lookup("TRACKED_ASSETS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    if parsed.is_empty() {
        DEFAULT_TRACKED_ASSETS.iter().map(|s| s.to_string()).collect()
    } else {
        parsed
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: text(&lookup, "DATABASE_URL", &defaults.url),
            max_connections: ranged(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                1..=100,
                defaults.max_connections,
            ),
            log_queries: lookup("DATABASE_LOG_QUERIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_queries),
        };

        let poll_ms = ranged(
            &lookup,
            "ORDER_POLL_INTERVAL_MS",
            1..=60_000,
            POLL_INTERVAL.as_millis() as u64,
        );

        Ok(AppConfig {
            api_key: required(&lookup, "COINSPOT_API_KEY")?,
            api_secret: required(&lookup, "COINSPOT_API_SECRET")?,
            base_url: text(&lookup, "COINSPOT_BASE_URL", DEFAULT_BASE_URL),
            exchange: text(&lookup, "EXCHANGE_NAME", DEFAULT_EXCHANGE),
            quote_currency: text(&lookup, "QUOTE_CURRENCY", DEFAULT_QUOTE_CURRENCY).to_uppercase(),
            tracked_assets: tracked_assets(&lookup),
            database,
            lookback_days: ranged(&lookup, "LOOKBACK_DAYS", 3..=365, DEFAULT_LOOKBACK_DAYS),
            order_max_retries: ranged(&lookup, "ORDER_MAX_RETRIES", 1..=100, MAX_RETRIES),
            order_poll_interval: Duration::from_millis(poll_ms),
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            exchange: self.exchange.clone(),
            quote_currency: self.quote_currency.clone(),
            tracked_assets: self.tracked_assets.clone(),
            order_polling: OrderPollingConfig {
                max_retries: self.order_max_retries,
                poll_interval: self.order_poll_interval,
            },
        }
    }

    pub fn coinspot(&self) -> CoinSpotConfig {
        CoinSpotConfig {
            api_base: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            exchange: self.exchange.clone(),
            quote_currency: self.quote_currency.clone(),
        }
    }
}
