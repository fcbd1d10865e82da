//! Background ingestion of newly written blocks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::ConfigError;

use super::service::ExplorerService;
use super::worker::parse_env;

/// Block ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Sleep between polls once the store has nothing new
    pub poll_interval: Duration,
    /// Maximum blocks pulled per batch
    pub batch_size: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 500,
        }
    }
}

impl IngestConfig {
    /// Read overrides from `INGEST_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let batch_size = parse_env("INGEST_BATCH_SIZE")?.unwrap_or(defaults.batch_size);
        if batch_size < 1 {
            return Err(ConfigError::InvalidValue {
                name: "INGEST_BATCH_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            poll_interval: parse_env("INGEST_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size,
        })
    }
}

/// Spawn the block ingestor, returning its handle and shutdown sender.
///
/// Resumes after the persisted block marker and drains full batches back to
/// back before sleeping for `poll_interval`.
pub fn spawn_ingestor(
    explorer: Arc<ExplorerService>,
    config: IngestConfig,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut cursor = match explorer.last_processed_block().await {
            Ok(marker) => marker.unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Could not read block marker, ingesting from the start");
                0
            }
        };
        info!(cursor, "Block ingestor started");

        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cursor = drain(&explorer, cursor, config.batch_size, &shutdown_rx).await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(cursor, "Block ingestor shutting down");
                        break;
                    }
                }
            }
        }
    });
    (handle, shutdown_tx)
}

async fn drain(
    explorer: &ExplorerService,
    mut cursor: i64,
    batch_size: i64,
    shutdown_rx: &watch::Receiver<bool>,
) -> i64 {
    while !*shutdown_rx.borrow() {
        match explorer.ingest_new_blocks(cursor, batch_size).await {
            Ok(progress) => {
                if let Some(last) = progress.last_block {
                    cursor = cursor.max(last);
                }
                debug!(
                    blocks = progress.blocks,
                    accepted = progress.report.accepted.len(),
                    cursor,
                    "Ingested block batch"
                );
                if (progress.blocks as i64) < batch_size {
                    break;
                }
            }
            Err(e) => {
                error!(cursor, error = %e, "Block ingestion failed");
                break;
            }
        }
    }
    cursor
}
