//! Application layer containing business logic and shared state.

pub mod charts;
pub mod ingest;
pub mod pagination;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod worker;

pub use charts::{ChartService, SweepReport};
pub use ingest::{IngestConfig, spawn_ingestor};
pub use pagination::{PageWindow, materialize, paginate, plan_window};
pub use scheduler::{AdmissionController, AdmissionPermit, RefreshQueue};
pub use service::{ExplorerService, MAX_BLOCK_ID_KEY};
pub use state::AppState;
pub use worker::{RefreshConfig, RefreshWorker, spawn_refresh_worker, spawn_sweeper};
