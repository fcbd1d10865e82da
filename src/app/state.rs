//! Application state management.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::{BlockStore, CacheClient, PayloadDecoder, RefreshRequest};

use super::charts::ChartService;
use super::scheduler::{AdmissionController, RefreshQueue};
use super::service::ExplorerService;
use super::worker::RefreshConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub explorer: Arc<ExplorerService>,
    pub charts: Arc<ChartService>,
    pub cache: Arc<dyn CacheClient>,
}

impl AppState {
    /// Wire the services together.
    ///
    /// The returned receiver must be handed to the refresh worker; until then
    /// refresh requests accumulate up to the queue capacity and are dropped
    /// beyond it.
    #[must_use]
    pub fn new(
        store: Arc<dyn BlockStore>,
        cache: Arc<dyn CacheClient>,
        decoder: Arc<dyn PayloadDecoder>,
        config: &RefreshConfig,
    ) -> (Self, mpsc::Receiver<RefreshRequest>) {
        let (queue, receiver) = RefreshQueue::bounded(config.queue_capacity);
        let admission = Arc::new(AdmissionController::new(
            config.max_in_flight,
            config.admission_poll,
        ));
        let charts = Arc::new(ChartService::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            admission,
            queue,
        ));
        let explorer = Arc::new(ExplorerService::new(
            store,
            Arc::clone(&cache),
            decoder,
            Arc::clone(&charts),
        ));
        (
            Self {
                explorer,
                charts,
                cache,
            },
            receiver,
        )
    }
}
