//! Explorer service: transaction listings, batch ingestion and health.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    AppError, BlockStore, CacheClient, ChartType, HealthResponse, HealthStatus, IngestProgress,
    IngestRecord, IngestReport, Observation, PayloadDecoder, SortOrder, TransactionPage, TransactionScope,
    ValidationError,
};
use crate::infra::HashLedger;

use super::charts::ChartService;
use super::pagination::{materialize, plan_window};

/// Cache key of the highest block id ingested so far
pub const MAX_BLOCK_ID_KEY: &str = "max-block-id";

/// Maximum page size of a transaction listing
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Application service for the explorer read path
pub struct ExplorerService {
    store: Arc<dyn BlockStore>,
    cache: Arc<dyn CacheClient>,
    decoder: Arc<dyn PayloadDecoder>,
    ledger: HashLedger,
    /// Held across the read-compare-write of the block marker
    marker_lock: Mutex<()>,
    charts: Arc<ChartService>,
}

impl ExplorerService {
    #[must_use]
    pub fn new(
        store: Arc<dyn BlockStore>,
        cache: Arc<dyn CacheClient>,
        decoder: Arc<dyn PayloadDecoder>,
        charts: Arc<ChartService>,
    ) -> Self {
        Self {
            store,
            cache,
            decoder,
            ledger: HashLedger::new(),
            marker_lock: Mutex::new(()),
            charts,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &HashLedger {
        &self.ledger
    }

    /// One page of transactions in `scope`, reconstructed from block payloads.
    ///
    /// Only blocks overlapping the page are fetched with their payload.
    #[instrument(skip(self))]
    pub async fn get_transaction_page(
        &self,
        scope: TransactionScope,
        page: i64,
        limit: i64,
        order: SortOrder,
    ) -> Result<TransactionPage, AppError> {
        if page < 1 {
            return Err(invalid("page", "Page must be at least 1"));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(invalid("limit", "Limit must be between 1 and 100"));
        }
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| invalid("page", "Page is out of range"))?;

        let headers = self.store.block_headers(&scope, order).await?;
        let window = plan_window(&headers, offset, limit);
        debug!(
            total = window.total,
            needed_blocks = window.block_ids.len(),
            "Planned page window"
        );

        let items = if window.is_empty() {
            Vec::new()
        } else {
            let blocks = self.store.blocks_by_ids(&scope, &window.block_ids).await?;
            materialize(&window, &blocks, &scope, self.decoder.as_ref())?
        };

        Ok(TransactionPage {
            total: window.total,
            page,
            limit,
            items,
        })
    }

    /// Feed a batch of records through the dedup ledger.
    ///
    /// Marker and chart invalidation failures are logged and do not fail the batch.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn ingest_batch(&self, records: Vec<IngestRecord>) -> IngestReport {
        let mut report = IngestReport::default();
        for record in records {
            match self.ledger.observe(&record.hash, record.block_id) {
                Observation::New => report.accepted.push(record),
                Observation::Duplicate { original_block } => {
                    debug!(
                        hash = %record.hash,
                        original_block,
                        seen_in = record.block_id,
                        "Duplicate transaction hash"
                    );
                    report.duplicates += 1;
                }
            }
        }

        if let Some(max_block) = report.accepted.iter().map(|r| r.block_id).max() {
            self.advance_marker(max_block).await;
        }

        let touched: BTreeSet<i64> = report.accepted.iter().map(|r| r.ecosystem).collect();
        for ecosystem in touched {
            for chart in ChartType::ALL.into_iter().filter(ChartType::is_event_driven) {
                self.charts.invalidate(chart, ecosystem).await;
            }
        }

        info!(
            accepted = report.accepted.len(),
            duplicates = report.duplicates,
            "Ingest batch processed"
        );
        report
    }

    /// Pull up to `limit` blocks with id above `after` and ingest their transactions.
    ///
    /// Blocks whose payload does not decode are skipped and reported. The
    /// marker moves to the highest block pulled, even when every record in
    /// it was a duplicate.
    #[instrument(skip(self))]
    pub async fn ingest_new_blocks(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<IngestProgress, AppError> {
        let blocks = self.store.blocks_after(after, limit).await?;
        let Some(last_block) = blocks.iter().map(|block| block.id).max() else {
            return Ok(IngestProgress::default());
        };

        let mut records = Vec::new();
        let mut undecodable = Vec::new();
        for block in &blocks {
            match self.decoder.decode(block.id, &block.payload) {
                Ok(txs) => records.extend(txs.into_iter().map(|tx| IngestRecord {
                    hash: tx.hash,
                    block_id: block.id,
                    ecosystem: tx.ecosystem,
                })),
                Err(e) => {
                    warn!(block_id = block.id, error = %e, "Skipping undecodable block");
                    undecodable.push(block.id);
                }
            }
        }

        let report = self.ingest_batch(records).await;
        self.advance_marker(last_block).await;

        Ok(IngestProgress {
            blocks: blocks.len(),
            last_block: Some(last_block),
            report,
            undecodable,
        })
    }

    /// Highest block id recorded by ingestion, surviving restarts with the cache
    pub async fn last_processed_block(&self) -> Result<Option<i64>, AppError> {
        let Some(bytes) = self.cache.get(MAX_BLOCK_ID_KEY).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        text.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| AppError::Serialization(format!("Invalid {}: {}", MAX_BLOCK_ID_KEY, e)))
    }

    async fn advance_marker(&self, block_id: i64) {
        let _guard = self.marker_lock.lock().await;
        let current = match self.last_processed_block().await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Failed to read block marker, overwriting");
                None
            }
        };
        if current.is_some_and(|current| current >= block_id) {
            return;
        }
        if let Err(e) = self
            .cache
            .set(MAX_BLOCK_ID_KEY, block_id.to_string().as_bytes(), None)
            .await
        {
            warn!(block_id, error = %e, "Failed to advance block marker");
        }
    }

    /// Perform health check on all dependencies
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.store.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        let cache_health = match self.cache.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        HealthResponse::new(db_health, cache_health, self.charts.admission().in_flight())
    }
}

fn invalid(field: &str, message: &str) -> AppError {
    AppError::Validation(ValidationError::InvalidField {
        field: field.to_string(),
        message: message.to_string(),
    })
}
