//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ledger_explorer::api::create_router;
use ledger_explorer::app::{
    AppState, IngestConfig, RefreshConfig, spawn_ingestor, spawn_refresh_worker, spawn_sweeper,
};
use ledger_explorer::domain::{CacheClient, ConfigError};
use ledger_explorer::infra::{
    BincodePayloadDecoder, MemoryCacheClient, PostgresClient, PostgresConfig, RedisCacheClient,
};

/// Application configuration
struct Config {
    database_url: String,
    /// Redis URL (optional - uses the in-process cache if not set)
    redis_url: Option<SecretString>,
    host: String,
    port: u16,
    refresh: RefreshConfig,
    ingest: IngestConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL".to_string()))?;
        let redis_url = env::var("REDIS_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .map(SecretString::from);
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Ok(Self {
            database_url,
            redis_url,
            host,
            port,
            refresh: RefreshConfig::from_env().context("Invalid refresh configuration")?,
            ingest: IngestConfig::from_env().context("Invalid ingest configuration")?,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🏗️  Ledger Explorer v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("📦 Initializing infrastructure...");

    let postgres_client =
        PostgresClient::new(&config.database_url, PostgresConfig::default()).await?;
    info!("   ✓ Database connected");

    let cache: Arc<dyn CacheClient> = match &config.redis_url {
        Some(url) => {
            let client = RedisCacheClient::connect(url).await?;
            info!("   ✓ Redis chart cache connected");
            Arc::new(client)
        }
        None => {
            warn!("   ⚠ REDIS_URL not set, charts are cached in process memory");
            Arc::new(MemoryCacheClient::new())
        }
    };

    let (app_state, refresh_rx) = AppState::new(
        Arc::new(postgres_client),
        cache,
        Arc::new(BincodePayloadDecoder),
        &config.refresh,
    );
    let app_state = Arc::new(app_state);

    match app_state.explorer.last_processed_block().await {
        Ok(Some(block)) => info!("   ✓ Last processed block: {}", block),
        Ok(None) => info!("   ○ No processed block marker yet"),
        Err(e) => warn!("   ⚠ Could not read processed block marker: {}", e),
    }

    if config.refresh.bootstrap {
        match app_state.charts.sweep_all().await {
            Ok(report) => info!(
                "   ✓ Charts warmed ({} refreshed, {} failed)",
                report.refreshed, report.failed
            ),
            Err(e) => warn!("   ⚠ Startup chart sweep failed, charts warm lazily: {}", e),
        }
    } else {
        info!("   ○ Startup chart sweep disabled");
    }

    let (_worker_handle, worker_shutdown_tx) =
        spawn_refresh_worker(Arc::clone(&app_state.charts), refresh_rx);
    info!(
        "   ✓ Refresh worker started (max in flight: {}, queue: {})",
        config.refresh.max_in_flight, config.refresh.queue_capacity
    );

    let (_sweeper_handle, sweeper_shutdown_tx) = spawn_sweeper(
        Arc::clone(&app_state.charts),
        config.refresh.sweep_interval,
    );
    info!(
        "   ✓ Chart sweeper started (every {}s)",
        config.refresh.sweep_interval.as_secs()
    );

    let (_ingestor_handle, ingestor_shutdown_tx) =
        spawn_ingestor(Arc::clone(&app_state.explorer), config.ingest.clone());
    info!(
        "   ✓ Block ingestor started (batch: {}, poll: {}ms)",
        config.ingest.batch_size,
        config.ingest.poll_interval.as_millis()
    );

    let router = create_router(Arc::clone(&app_state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = ingestor_shutdown_tx.send(true);
    let _ = worker_shutdown_tx.send(true);
    let _ = sweeper_shutdown_tx.send(true);

    info!("Waiting for running chart refreshes...");
    app_state.charts.admission().wait_idle().await;

    info!("Server shutdown complete");
    Ok(())
}
