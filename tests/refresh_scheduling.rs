//! Chart refresh scheduling and ingestion behaviour under concurrency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ledger_explorer::app::{
    AdmissionController, AppState, ChartService, RefreshConfig, RefreshQueue,
    spawn_refresh_worker,
};
use ledger_explorer::domain::{CacheClient, ChartKey, ChartType, IngestRecord};
use ledger_explorer::infra::MemoryCacheClient;
use ledger_explorer::test_utils::{CountingDecoder, MockBlockStore};

fn record(hash: &str, block_id: i64) -> IngestRecord {
    IngestRecord {
        hash: hash.to_string(),
        block_id,
        ecosystem: 1,
    }
}

#[tokio::test]
async fn test_admission_bounds_concurrent_refreshes() {
    const CEILING: usize = 3;
    let store = Arc::new(MockBlockStore::new().with_query_delay(Duration::from_millis(15)));
    let (queue, _receiver) = RefreshQueue::bounded(8);
    let admission = Arc::new(AdmissionController::new(CEILING, Duration::from_millis(2)));
    let charts = Arc::new(ChartService::new(
        store.clone(),
        Arc::new(MemoryCacheClient::new()),
        Arc::clone(&admission),
        queue,
    ));

    let mut tasks = tokio::task::JoinSet::new();
    for entity in 1..=40 {
        let charts = Arc::clone(&charts);
        tasks.spawn(async move {
            charts
                .refresh_admitted(ChartKey::new(ChartType::Activity, entity))
                .await
        });
    }

    let mut completed = 0;
    while let Some(result) = tasks.join_next().await {
        assert!(result.unwrap());
        completed += 1;
    }

    assert_eq!(completed, 40);
    assert_eq!(store.aggregate_calls(), 40);
    assert!(store.max_concurrent_aggregates() <= CEILING);
    assert_eq!(admission.in_flight(), 0);
}

#[tokio::test]
async fn test_sweep_completes_under_small_ceiling() {
    let store = Arc::new(
        MockBlockStore::new()
            .with_ecosystems((1..=10).collect())
            .with_query_delay(Duration::from_millis(5)),
    );
    let cache = Arc::new(MemoryCacheClient::new());
    let (queue, _receiver) = RefreshQueue::bounded(8);
    let charts = Arc::new(ChartService::new(
        store.clone(),
        cache.clone(),
        Arc::new(AdmissionController::new(2, Duration::from_millis(1))),
        queue,
    ));

    let report = charts.sweep_all().await.unwrap();
    assert_eq!(report.refreshed, 40);
    assert_eq!(report.failed, 0);
    assert_eq!(cache.len(), 40);
    // fee burn issues two queries per refresh
    assert!(store.max_concurrent_aggregates() <= 4);
}

#[tokio::test]
async fn test_sweep_fails_without_ecosystem_list() {
    let store = Arc::new(MockBlockStore::new().with_ecosystems(vec![1, 2]));
    let (queue, _receiver) = RefreshQueue::bounded(8);
    let charts = Arc::new(ChartService::new(
        store.clone(),
        Arc::new(MemoryCacheClient::new()),
        Arc::new(AdmissionController::default()),
        queue,
    ));

    assert!(charts.refresh_admitted(ChartKey::new(ChartType::Activity, 1)).await);

    store.set_failing(true);
    assert!(charts.sweep_all().await.is_err());
}

#[tokio::test]
async fn test_cold_read_never_waits_and_converges() {
    let store = MockBlockStore::new().with_query_delay(Duration::from_millis(200));
    let expected = store.expected_chart(ChartType::TopContracts);
    let (state, receiver) = AppState::new(
        Arc::new(store),
        Arc::new(MemoryCacheClient::new()),
        Arc::new(CountingDecoder::new()),
        &RefreshConfig::default(),
    );
    let (worker, shutdown_tx) = spawn_refresh_worker(Arc::clone(&state.charts), receiver);

    let started = Instant::now();
    let cold = state.charts.get_chart(ChartType::TopContracts, 5).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!cold.from_cache);

    let mut snapshot = cold;
    for _ in 0..100 {
        if state.cache.exists("top_contracts-5").await.unwrap() {
            snapshot = state.charts.get_chart(ChartType::TopContracts, 5).await.unwrap();
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(snapshot.from_cache);
    assert_eq!(snapshot.data, expected);

    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_ingest_a_b_a_scenario() {
    let (state, _receiver) = AppState::new(
        Arc::new(MockBlockStore::new()),
        Arc::new(MemoryCacheClient::new()),
        Arc::new(CountingDecoder::new()),
        &RefreshConfig::default(),
    );

    let report = state
        .explorer
        .ingest_batch(vec![record("a", 1), record("b", 1), record("a", 2)])
        .await;

    let accepted: Vec<_> = report.accepted.iter().map(|r| r.hash.as_str()).collect();
    assert_eq!(accepted, vec!["a", "b"]);
    assert_eq!(report.duplicates, 1);
    assert_eq!(state.explorer.ledger().origin_of("a"), Some(1));
    assert_eq!(state.explorer.last_processed_block().await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_concurrent_ingest_accepts_each_hash_once() {
    let (state, _receiver) = AppState::new(
        Arc::new(MockBlockStore::new()),
        Arc::new(MemoryCacheClient::new()),
        Arc::new(CountingDecoder::new()),
        &RefreshConfig::default(),
    );

    let mut tasks = tokio::task::JoinSet::new();
    for batch in 0..8i64 {
        let explorer = Arc::clone(&state.explorer);
        tasks.spawn(async move {
            let records = (0..50).map(|i| record(&format!("h{}", i), batch)).collect();
            explorer.ingest_batch(records).await.accepted.len()
        });
    }

    let mut accepted = 0;
    while let Some(count) = tasks.join_next().await {
        accepted += count.unwrap();
    }
    assert_eq!(accepted, 50);
    assert_eq!(state.explorer.ledger().len(), 50);
}
