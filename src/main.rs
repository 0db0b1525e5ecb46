use sentinel::application::actors::telemetry_actor::TelemetrySink;
use sentinel::application::handlers::health_handler::{self, HealthState};
use sentinel::application::services::trading_engine::TradingEngine;
use sentinel::config::TradingConfig;
use sentinel::domain::repositories::ledger_store::LedgerStore;
use sentinel::domain::repositories::oracle::ModelProvider;
use sentinel::domain::repositories::venue_client::VenueClient;
use sentinel::infrastructure::{HttpModelProvider, NeutralModelProvider, PaperVenue, PaperVenueConfig};
use sentinel::persistence::{init_database_with, DatabaseConfig, SqliteLedger};
use sentinel::task_runner::{run_periodic, LoopConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ORACLE_TIMEOUT: Duration = Duration::from_secs(10);
const TELEMETRY_DRAIN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Sentinel starting...");

    let config = TradingConfig::from_env();
    let database = DatabaseConfig::from_env();
    let pool = init_database_with(&database).await?;
    let ledger: Arc<dyn LedgerStore> = Arc::new(SqliteLedger::new(pool.clone()));

    let paper = Arc::new(PaperVenue::new(PaperVenueConfig::default()));
    let venue: Arc<dyn VenueClient> = paper.clone();
    info!("Venue: {}", venue.name());

    let models: Arc<dyn ModelProvider> = match &config.oracle_url {
        Some(url) => match HttpModelProvider::new(url, ORACLE_TIMEOUT) {
            Ok(provider) => {
                info!("Oracle model service: {}", url);
                Arc::new(provider)
            }
            Err(e) => {
                warn!("Oracle disabled, using neutral probabilities: {}", e);
                Arc::new(NeutralModelProvider)
            }
        },
        None => {
            info!("No ORACLE_URL set, using neutral probabilities");
            Arc::new(NeutralModelProvider)
        }
    };

    let telemetry = TelemetrySink::spawn(ledger.clone(), config.telemetry_config());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Paper market moves one bar per poll interval
    let market_loop = config.loop_config();
    let market_rx = shutdown_rx.clone();
    let market_venue = paper.clone();
    let market = tokio::spawn(async move {
        run_periodic(
            "paper-market",
            LoopConfig {
                interval: market_loop.interval,
                failure_backoff: market_loop.interval,
            },
            market_rx,
            move || {
                let venue = market_venue.clone();
                async move {
                    venue.step();
                    Ok(())
                }
            },
        )
        .await;
    });

    let engine = TradingEngine::new(
        venue.clone(),
        ledger.clone(),
        models,
        telemetry.handle(),
        config.clone(),
    );
    let health = HealthState {
        engine: engine.stats(),
        telemetry: telemetry.handle(),
    };
    let engine_rx = shutdown_rx.clone();
    let engine_task = tokio::spawn(async move {
        engine.run(engine_rx).await;
    });

    let app = health_handler::router(health);
    let listener = tokio::net::TcpListener::bind(&config.health_bind_addr).await?;
    info!("Health endpoint listening on {}", config.health_bind_addr);

    let shutdown_signal = async move {
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
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutting down gracefully...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = engine_task.await {
        error!("Trading engine task failed: {}", e);
    }
    if let Err(e) = market.await {
        error!("Paper market task failed: {}", e);
    }

    telemetry.shutdown(TELEMETRY_DRAIN_GRACE).await;
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}
