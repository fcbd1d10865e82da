//! Background refresh worker and periodic sweeper.

use std::collections::HashSet;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::{ChartKey, ConfigError, RefreshCommand, RefreshRequest};

use super::charts::ChartService;
use super::scheduler::{DEFAULT_ADMISSION_POLL, DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY};

/// Refresh scheduling configuration
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum concurrently running chart refreshes
    pub max_in_flight: usize,
    /// Capacity of the refresh signal queue
    pub queue_capacity: usize,
    /// Sleep between admission attempts
    pub admission_poll: Duration,
    /// Interval between full sweeps
    pub sweep_interval: Duration,
    /// Run a full sweep before serving
    pub bootstrap: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            admission_poll: DEFAULT_ADMISSION_POLL,
            sweep_interval: Duration::from_secs(3600),
            bootstrap: true,
        }
    }
}

impl RefreshConfig {
    /// Read overrides from `REFRESH_*` environment variables.
    ///
    /// Unset or empty variables keep their default; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_in_flight: parse_env("REFRESH_MAX_IN_FLIGHT")?.unwrap_or(defaults.max_in_flight),
            queue_capacity: parse_env("REFRESH_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
            admission_poll: parse_env("REFRESH_ADMISSION_POLL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.admission_poll),
            sweep_interval: parse_env("REFRESH_SWEEP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            bootstrap: parse_env("REFRESH_BOOTSTRAP")?.unwrap_or(defaults.bootstrap),
        })
    }
}

pub(crate) fn parse_env<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("{:?}: {}", raw, e),
                })
        }
        _ => Ok(None),
    }
}

/// Single consumer of the refresh queue.
///
/// Keys with a refresh already running are coalesced: a `Start` for such a
/// key is ignored until the running task reports `Done`.
pub struct RefreshWorker {
    charts: Arc<ChartService>,
    receiver: mpsc::Receiver<RefreshRequest>,
    in_flight: HashSet<ChartKey>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RefreshWorker {
    #[must_use]
    pub fn new(
        charts: Arc<ChartService>,
        receiver: mpsc::Receiver<RefreshRequest>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            charts,
            receiver,
            in_flight: HashSet::new(),
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!("Refresh worker started");
        loop {
            tokio::select! {
                request = self.receiver.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!(pending = self.in_flight.len(), "Refresh worker stopped");
    }

    fn handle(&mut self, request: RefreshRequest) {
        let key = request.key;
        match request.command {
            RefreshCommand::Start => {
                if !self.in_flight.insert(key) {
                    debug!(key = %key, "Refresh already running, coalescing");
                    return;
                }
                let charts = Arc::clone(&self.charts);
                tokio::spawn(async move {
                    let refresh = tokio::spawn({
                        let charts = Arc::clone(&charts);
                        async move { charts.refresh_admitted(key).await }
                    });
                    // Done must reach the worker even if the refresh panicked.
                    if let Err(e) = refresh.await {
                        error!(key = %key, error = %e, "Chart refresh task aborted");
                    }
                    charts.queue().report_done(key).await;
                });
            }
            RefreshCommand::Done => {
                self.in_flight.remove(&key);
            }
        }
    }
}

/// Spawn the refresh worker, returning its handle and shutdown sender
pub fn spawn_refresh_worker(
    charts: Arc<ChartService>,
    receiver: mpsc::Receiver<RefreshRequest>,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = RefreshWorker::new(charts, receiver, shutdown_rx);
    let handle = tokio::spawn(worker.run());
    (handle, shutdown_tx)
}

/// Spawn the periodic full sweep, returning its handle and shutdown sender.
///
/// The first sweep runs one `interval` after spawning.
pub fn spawn_sweeper(
    charts: Arc<ChartService>,
    interval: Duration,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = charts.sweep_all().await {
                        error!(error = %e, "Periodic chart sweep failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Chart sweeper shutting down");
                        break;
                    }
                }
            }
        }
    });
    (handle, shutdown_tx)
}
