//! Persistence Layer
//!
//! SQLite storage for everything the strategies record: price snapshots,
//! positions, strategy logs, target weightings, daily returns and orders.
//! Uses sqlx for async access; the schema is created on startup.
//!
//! # Database Schema
//!
//! ## price_snapshots
//! - id: Serial
//! - exchange, name, currency: Text
//! - bid, ask, last: Decimal as text
//! - timestamp: Timestamp
//!
//! ## positions
//! - id: Serial
//! - exchange, name: Text
//! - quantity, current_price: Decimal as text
//! - timestamp: Timestamp
//!
//! ## strategy_logs
//! - id: Serial
//! - strategy, message: Text
//! - timestamp: Timestamp
//!
//! ## target_weightings
//! - exchange, name: Text (primary key)
//! - weight: Decimal as text
//! - timestamp: Timestamp
//!
//! ## daily_returns
//! - id: Serial
//! - exchange, name, return_type: Text
//! - value: Decimal as text
//! - timestamp: Timestamp
//!
//! ## orders
//! - id: Exchange order id (primary key)
//! - side: "BUY" or "SELL"
//! - rate, amount: Decimal as text
//! - total, sold_date, fee, gst, aud_total: NULL until filled
//! - cancelled: Boolean

pub mod models;
pub mod repository;

use crate::domain::errors::PersistenceError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

impl From<DatabaseError> for PersistenceError {
    fn from(err: DatabaseError) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "price_snapshots table",
        r#"
        CREATE TABLE IF NOT EXISTS price_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange TEXT NOT NULL,
            name TEXT NOT NULL,
            currency TEXT NOT NULL,
            bid TEXT NOT NULL,
            ask TEXT NOT NULL,
            last TEXT NOT NULL,
            timestamp DATETIME NOT NULL
        )
        "#,
    ),
    (
        "positions table",
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange TEXT NOT NULL,
            name TEXT NOT NULL,
            quantity TEXT NOT NULL,
            current_price TEXT NOT NULL,
            timestamp DATETIME NOT NULL
        )
        "#,
    ),
    (
        "strategy_logs table",
        r#"
        CREATE TABLE IF NOT EXISTS strategy_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            strategy TEXT NOT NULL,
            message TEXT NOT NULL,
            timestamp DATETIME NOT NULL
        )
        "#,
    ),
    (
        "target_weightings table",
        r#"
        CREATE TABLE IF NOT EXISTS target_weightings (
            exchange TEXT NOT NULL,
            name TEXT NOT NULL,
            weight TEXT NOT NULL,
            timestamp DATETIME NOT NULL,
            PRIMARY KEY (exchange, name)
        )
        "#,
    ),
    (
        "daily_returns table",
        r#"
        CREATE TABLE IF NOT EXISTS daily_returns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange TEXT NOT NULL,
            name TEXT NOT NULL,
            return_type TEXT NOT NULL,
            value TEXT NOT NULL,
            timestamp DATETIME NOT NULL
        )
        "#,
    ),
    (
        "orders table",
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            exchange TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('BUY', 'SELL')),
            coin TEXT NOT NULL,
            market TEXT NOT NULL,
            rate TEXT NOT NULL,
            amount TEXT NOT NULL,
            total TEXT,
            sold_date DATETIME,
            fee TEXT,
            gst TEXT,
            aud_total TEXT,
            cancelled BOOLEAN NOT NULL DEFAULT 0,
            timestamp DATETIME NOT NULL
        )
        "#,
    ),
    (
        "index",
        "CREATE INDEX IF NOT EXISTS idx_price_snapshots_timestamp ON price_snapshots(timestamp)",
    ),
    (
        "index",
        "CREATE INDEX IF NOT EXISTS idx_positions_timestamp ON positions(timestamp)",
    ),
    (
        "index",
        "CREATE INDEX IF NOT EXISTS idx_strategy_logs_strategy ON strategy_logs(strategy, timestamp)",
    ),
    (
        "index",
        "CREATE INDEX IF NOT EXISTS idx_daily_returns_timestamp ON daily_returns(timestamp)",
    ),
    (
        "index",
        "CREATE INDEX IF NOT EXISTS idx_orders_timestamp ON orders(timestamp)",
    ),
];

/// Initialize the database connection pool
///
/// # Arguments
/// - `config`: URL (e.g., "sqlite://data/rebalance_bot.db"), pool size and query logging
///
/// # Errors
/// Returns error if the connection or a migration fails
pub async fn init_database(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let level = if config.log_queries {
        tracing::log::LevelFilter::Debug
    } else {
        tracing::log::LevelFilter::Trace
    };
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .log_statements(level);

    // An in-memory database lives per connection, so it must stay on one.
    let max_connections = if config.url.contains(":memory:") {
        1
    } else {
        config.max_connections
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    for (what, statement) in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create {}: {}", what, e)))?;
    }

    info!("Database migrations completed");

    Ok(())
}

const DEFAULT_DATABASE_URL: &str = "sqlite://rebalance_bot.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://rebalance_bot.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Log every statement at debug level
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            log_queries: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database(&DatabaseConfig::in_memory()).await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations() {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
             ('price_snapshots', 'positions', 'strategy_logs', 'target_weightings', 'daily_returns', 'orders')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 6);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        assert!(run_migrations(&pool).await.is_ok());
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://rebalance_bot.db");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_database_error_maps_to_persistence_error() {
        let err: PersistenceError = DatabaseError::QueryError("boom".to_string()).into();
        assert_eq!(err, PersistenceError::Database("Query error: boom".to_string()));
    }
}
