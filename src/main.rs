use rebalance_bot::application::services::portfolio_service::{PortfolioService, Stores};
use rebalance_bot::application::strategies::{
    CaptureStrategy, DailyReturnsStrategy, RebalanceStrategy, RecalculateWeightsStrategy,
};
use rebalance_bot::config::AppConfig;
use rebalance_bot::domain::clock::{Clock, SystemClock};
use rebalance_bot::infrastructure::coinspot_client::CoinSpotClient;
use rebalance_bot::persistence::init_database;
use rebalance_bot::persistence::repository::{
    SqliteDailyReturnRepository, SqliteOrderRepository, SqlitePositionRepository,
    SqlitePriceSnapshotRepository, SqliteStrategyLogRepository, SqliteTargetWeightingRepository,
};
use rebalance_bot::task_runner::run_strategy_loop;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rebalance_bot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Starting rebalance bot on {} ({}), tracking {:?}",
        config.exchange, config.quote_currency, config.tracked_assets
    );

    let pool = init_database(&config.database).await?;
    let stores = Stores {
        positions: Arc::new(SqlitePositionRepository::new(pool.clone())),
        prices: Arc::new(SqlitePriceSnapshotRepository::new(pool.clone())),
        logs: Arc::new(SqliteStrategyLogRepository::new(pool.clone())),
        weightings: Arc::new(SqliteTargetWeightingRepository::new(pool.clone())),
        daily_returns: Arc::new(SqliteDailyReturnRepository::new(pool.clone())),
        orders: Arc::new(SqliteOrderRepository::new(pool.clone())),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = Arc::new(CoinSpotClient::new(config.coinspot(), clock.clone())?);
    let service = Arc::new(PortfolioService::new(
        gateway,
        stores,
        clock,
        config.service_settings(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = vec![
        tokio::spawn(run_strategy_loop(
            CaptureStrategy::new(service.clone()),
            shutdown_rx.clone(),
        )),
        tokio::spawn(run_strategy_loop(
            DailyReturnsStrategy::new(service.clone()),
            shutdown_rx.clone(),
        )),
        tokio::spawn(run_strategy_loop(
            RecalculateWeightsStrategy::new(service.clone(), config.lookback_days),
            shutdown_rx.clone(),
        )),
        tokio::spawn(run_strategy_loop(
            RebalanceStrategy::new(service.clone()),
            shutdown_rx,
        )),
    ];

    info!("Strategies started. Press Ctrl+C to stop.");
    shutdown_signal().await;

    info!("Shutting down, waiting for running strategies to finish...");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Strategy task ended abnormally: {}", e);
        }
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}
