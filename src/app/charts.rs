//! Aggregate chart cache with stale-while-revalidate reads.
//!
//! Readers are served whatever the cache holds, or an empty default, and
//! never wait for a recomputation. Misses enqueue a refresh signal that the
//! refresh worker turns into an admitted recomputation.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    AppError, BlockStore, CacheClient, ChartData, ChartKey, ChartSnapshot, ChartType,
    FeeBurnSummary, ValidationError,
};

use super::scheduler::{AdmissionController, RefreshQueue};

/// Number of holders in the holdings chart
const HOLDINGS_LIMIT: i64 = 100;

/// Days covered by the daily series
const SERIES_DAYS: i64 = 30;

/// Number of contracts in the top contracts chart
const TOP_CONTRACTS_LIMIT: i64 = 10;

/// Outcome of a full sweep over every chart of every ecosystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub refreshed: usize,
    pub failed: usize,
}

/// Chart cache service
pub struct ChartService {
    store: Arc<dyn BlockStore>,
    cache: Arc<dyn CacheClient>,
    admission: Arc<AdmissionController>,
    queue: RefreshQueue,
}

impl ChartService {
    #[must_use]
    pub fn new(
        store: Arc<dyn BlockStore>,
        cache: Arc<dyn CacheClient>,
        admission: Arc<AdmissionController>,
        queue: RefreshQueue,
    ) -> Self {
        Self {
            store,
            cache,
            admission,
            queue,
        }
    }

    #[must_use]
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    #[must_use]
    pub fn queue(&self) -> &RefreshQueue {
        &self.queue
    }

    /// Read a chart without ever waiting on its recomputation.
    ///
    /// A cache failure or an unreadable cached value counts as a miss.
    #[instrument(skip(self))]
    pub async fn get_chart(
        &self,
        chart: ChartType,
        entity_id: i64,
    ) -> Result<ChartSnapshot, AppError> {
        validate_entity(entity_id)?;
        let key = ChartKey::new(chart, entity_id);

        let cached = match self.cache.get(&key.to_string()).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Chart cache read failed, treating as miss");
                None
            }
        };

        if let Some(bytes) = cached {
            match serde_json::from_slice::<ChartData>(&bytes) {
                Ok(data) if data.chart_type() == chart => {
                    return Ok(ChartSnapshot {
                        chart,
                        entity_id,
                        data,
                        from_cache: true,
                    });
                }
                Ok(_) => warn!(key = %key, "Cached chart has the wrong kind, treating as miss"),
                Err(e) => warn!(key = %key, error = %e, "Cached chart is unreadable, treating as miss"),
            }
        }

        debug!(key = %key, "Chart cache miss, requesting refresh");
        self.queue.request(key);

        Ok(ChartSnapshot {
            chart,
            entity_id,
            data: ChartData::empty(chart),
            from_cache: false,
        })
    }

    /// Fire-and-forget refresh request. Returns `false` if the signal was dropped.
    pub fn request_refresh(&self, chart: ChartType, entity_id: i64) -> Result<bool, AppError> {
        validate_entity(entity_id)?;
        Ok(self.queue.request(ChartKey::new(chart, entity_id)))
    }

    /// Recompute a chart and store it with its type's TTL.
    ///
    /// On failure the previously cached value is left untouched.
    #[instrument(skip(self))]
    pub async fn refresh(&self, chart: ChartType, entity_id: i64) -> Result<(), AppError> {
        let key = ChartKey::new(chart, entity_id);
        let data = self.compute(chart, entity_id).await?;
        let bytes = serde_json::to_vec(&data)?;
        self.cache.set(&key.to_string(), &bytes, chart.ttl()).await?;
        debug!(key = %key, bytes = bytes.len(), "Chart refreshed");
        Ok(())
    }

    /// Refresh `key` once an admission slot is free. Errors are logged, not returned.
    pub async fn refresh_admitted(&self, key: ChartKey) -> bool {
        let _permit = self.admission.acquire().await;
        match self.refresh(key.chart, key.entity_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(key = %key, error = %e, "Chart refresh failed, keeping previous value");
                false
            }
        }
    }

    /// Drop a chart after an event made it stale and queue its recomputation.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, chart: ChartType, entity_id: i64) {
        let key = ChartKey::new(chart, entity_id);
        if let Err(e) = self.cache.delete(&key.to_string()).await {
            warn!(key = %key, error = %e, "Failed to delete invalidated chart");
        }
        self.queue.request(key);
    }

    /// Recompute every chart of every ecosystem and wait for all of them.
    pub async fn sweep_all(self: &Arc<Self>) -> Result<SweepReport, AppError> {
        let ecosystems = self.store.ecosystems().await?;
        info!(
            ecosystems = ecosystems.len(),
            charts = ChartType::ALL.len(),
            "Starting full chart sweep"
        );

        let mut tasks = JoinSet::new();
        for ecosystem in ecosystems {
            for chart in ChartType::ALL {
                let service = Arc::clone(self);
                tasks.spawn(async move {
                    service
                        .refresh_admitted(ChartKey::new(chart, ecosystem))
                        .await
                });
            }
        }

        let mut report = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => report.refreshed += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    error!(error = %e, "Chart sweep task aborted");
                    report.failed += 1;
                }
            }
        }

        info!(
            refreshed = report.refreshed,
            failed = report.failed,
            "Full chart sweep complete"
        );
        Ok(report)
    }

    async fn compute(&self, chart: ChartType, ecosystem: i64) -> Result<ChartData, AppError> {
        let data = match chart {
            ChartType::Holdings => {
                ChartData::Holdings(self.store.holder_balances(ecosystem, HOLDINGS_LIMIT).await?)
            }
            ChartType::Activity => ChartData::Activity(
                self.store
                    .daily_transactions(ecosystem, SERIES_DAYS)
                    .await?,
            ),
            ChartType::FeeBurn => {
                let (total, daily) = tokio::try_join!(
                    self.store.total_fee_burn(ecosystem),
                    self.store.daily_fee_burn(ecosystem, SERIES_DAYS),
                )?;
                ChartData::FeeBurn(FeeBurnSummary { total, daily })
            }
            ChartType::TopContracts => ChartData::TopContracts(
                self.store
                    .top_contracts(ecosystem, TOP_CONTRACTS_LIMIT)
                    .await?,
            ),
        };
        Ok(data)
    }
}

fn validate_entity(entity_id: i64) -> Result<(), AppError> {
    if entity_id < 1 {
        return Err(AppError::Validation(ValidationError::InvalidField {
            field: "entity_id".to_string(),
            message: "Entity id must be positive".to_string(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RefreshCommand, RefreshRequest};
    use crate::infra::MemoryCacheClient;
    use crate::test_utils::{MockBlockStore, MockCacheClient};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    fn service_with(
        store: Arc<MockBlockStore>,
        cache: Arc<dyn CacheClient>,
        ceiling: usize,
    ) -> (Arc<ChartService>, mpsc::Receiver<RefreshRequest>) {
        let (queue, receiver) = RefreshQueue::bounded(16);
        let admission = Arc::new(AdmissionController::new(ceiling, Duration::from_millis(1)));
        (
            Arc::new(ChartService::new(store, cache, admission, queue)),
            receiver,
        )
    }

    #[tokio::test]
    async fn test_cold_key_returns_default_and_enqueues_once() {
        let store = Arc::new(MockBlockStore::new().with_query_delay(Duration::from_secs(5)));
        let (service, mut receiver) =
            service_with(Arc::clone(&store), Arc::new(MemoryCacheClient::new()), 2);

        let started = Instant::now();
        let snapshot = service.get_chart(ChartType::Activity, 1).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(!snapshot.from_cache);
        assert_eq!(snapshot.data, ChartData::empty(ChartType::Activity));

        let request = receiver.try_recv().unwrap();
        assert_eq!(request.key, ChartKey::new(ChartType::Activity, 1));
        assert_eq!(request.command, RefreshCommand::Start);
        assert!(receiver.try_recv().is_err());
        assert_eq!(store.aggregate_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_then_hit() {
        let store = Arc::new(MockBlockStore::new().with_ecosystems(vec![1]));
        let cache = Arc::new(MemoryCacheClient::new());
        let (service, mut receiver) = service_with(Arc::clone(&store), cache.clone(), 2);

        service.refresh(ChartType::TopContracts, 1).await.unwrap();
        let snapshot = service.get_chart(ChartType::TopContracts, 1).await.unwrap();
        assert!(snapshot.from_cache);
        assert_eq!(snapshot.data, store.expected_chart(ChartType::TopContracts));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_uses_chart_ttl() {
        let store = Arc::new(MockBlockStore::new());
        let cache = Arc::new(MemoryCacheClient::new());
        let (service, _receiver) = service_with(store, cache.clone(), 2);

        service.refresh(ChartType::Holdings, 3).await.unwrap();
        service.refresh(ChartType::FeeBurn, 3).await.unwrap();

        assert_eq!(cache.ttl_of("holdings-3"), Some(None));
        let fee_ttl = cache.ttl_of("fee_burn-3").unwrap().unwrap();
        assert!(fee_ttl <= Duration::from_secs(3 * 3600));
        assert!(fee_ttl > Duration::from_secs(3 * 3600 - 60));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let store = Arc::new(MockBlockStore::new());
        let cache = Arc::new(MemoryCacheClient::new());
        let (service, _receiver) = service_with(Arc::clone(&store), cache.clone(), 2);

        service.refresh(ChartType::Activity, 1).await.unwrap();
        store.set_failing(true);
        assert!(!service.refresh_admitted(ChartKey::new(ChartType::Activity, 1)).await);
        assert_eq!(service.admission().in_flight(), 0);

        let snapshot = service.get_chart(ChartType::Activity, 1).await.unwrap();
        assert!(snapshot.from_cache);
        assert_eq!(snapshot.data, store.expected_chart(ChartType::Activity));
    }

    #[tokio::test]
    async fn test_cache_read_failure_behaves_like_miss() {
        let store = Arc::new(MockBlockStore::new());
        let cache = Arc::new(MockCacheClient::failing("cache down"));
        let (service, mut receiver) = service_with(store, cache, 2);

        let snapshot = service.get_chart(ChartType::Holdings, 2).await.unwrap();
        assert!(!snapshot.from_cache);
        assert_eq!(receiver.try_recv().unwrap().key, ChartKey::new(ChartType::Holdings, 2));
    }

    #[tokio::test]
    async fn test_unreadable_cached_value_is_a_miss() {
        let store = Arc::new(MockBlockStore::new());
        let cache = Arc::new(MemoryCacheClient::new());
        cache.set("activity-1", b"not json", None).await.unwrap();
        let (service, mut receiver) = service_with(store, cache, 2);

        let snapshot = service.get_chart(ChartType::Activity, 1).await.unwrap();
        assert!(!snapshot.from_cache);
        assert!(receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_entity_is_rejected() {
        let (service, _receiver) = service_with(
            Arc::new(MockBlockStore::new()),
            Arc::new(MemoryCacheClient::new()),
            1,
        );
        assert!(matches!(
            service.get_chart(ChartType::Activity, 0).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_deletes_and_requests_refresh() {
        let store = Arc::new(MockBlockStore::new());
        let cache = Arc::new(MemoryCacheClient::new());
        let (service, mut receiver) = service_with(store, cache.clone(), 2);

        service.refresh(ChartType::Holdings, 4).await.unwrap();
        service.invalidate(ChartType::Holdings, 4).await;

        assert!(!cache.exists("holdings-4").await.unwrap());
        assert_eq!(
            receiver.try_recv().unwrap(),
            RefreshRequest::start(ChartKey::new(ChartType::Holdings, 4))
        );
    }

    #[tokio::test]
    async fn test_sweep_refreshes_every_chart_of_every_ecosystem() {
        let store = Arc::new(MockBlockStore::new().with_ecosystems(vec![1, 2, 3]));
        let cache = Arc::new(MemoryCacheClient::new());
        let (service, _receiver) = service_with(Arc::clone(&store), cache.clone(), 2);

        let report = service.sweep_all().await.unwrap();
        assert_eq!(report.refreshed, 12);
        assert_eq!(report.failed, 0);
        assert_eq!(cache.len(), 12);
        assert_eq!(service.admission().in_flight(), 0);
        assert!(store.max_concurrent_aggregates() <= 2 * 2);
    }
}
