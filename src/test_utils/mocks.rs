//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::{
    AppError, Block, BlockHeader, BlockStore, CacheClient, CacheError, ChartData, ChartType,
    ContractUsage, DailyAmount, DailyCount, DatabaseError, FeeBurnSummary, HolderBalance,
    PayloadDecoder, SortOrder, TransactionScope,
};
use crate::infra::{BincodePayloadDecoder, MemoryCacheClient};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

/// In-memory block store.
///
/// Declared block counts are derived from the payloads for each scope, the
/// way the `block_scopes` table would hold them. Blocks whose payload does
/// not decode keep their own `tx`.
pub struct MockBlockStore {
    blocks: Vec<Block>,
    ecosystems: Vec<i64>,
    config: MockConfig,
    should_fail: AtomicBool,
    should_panic: AtomicBool,
    is_healthy: AtomicBool,
    query_delay: Duration,
    aggregate_calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    fetched: Mutex<Vec<Vec<i64>>>,
}

impl MockBlockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            blocks: Vec::new(),
            ecosystems: vec![1],
            should_fail: AtomicBool::new(config.should_fail),
            should_panic: AtomicBool::new(false),
            config,
            is_healthy: AtomicBool::new(true),
            query_delay: Duration::ZERO,
            aggregate_calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    #[must_use]
    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }

    #[must_use]
    pub fn with_ecosystems(mut self, ecosystems: Vec<i64>) -> Self {
        self.ecosystems = ecosystems;
        self
    }

    /// Delay applied to every aggregate query
    #[must_use]
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.should_fail.store(failing, Ordering::SeqCst);
    }

    /// Make aggregate queries panic, as a bug in a refresh would
    pub fn set_panicking(&self, panicking: bool) {
        self.should_panic.store(panicking, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Aggregate queries executed so far
    pub fn aggregate_calls(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    /// Highest number of aggregate queries observed running at once
    pub fn max_concurrent_aggregates(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Ids requested by each `blocks_by_ids` call
    pub fn fetched_block_ids(&self) -> Vec<Vec<i64>> {
        self.fetched.lock().unwrap().clone()
    }

    /// Chart data this store produces for any ecosystem
    pub fn expected_chart(&self, chart: ChartType) -> ChartData {
        match chart {
            ChartType::Holdings => ChartData::Holdings(holders()),
            ChartType::Activity => ChartData::Activity(daily_counts()),
            ChartType::FeeBurn => ChartData::FeeBurn(FeeBurnSummary {
                total: FEE_BURN_TOTAL.to_string(),
                daily: daily_amounts(),
            }),
            ChartType::TopContracts => ChartData::TopContracts(contracts()),
        }
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message(),
            )));
        }
        Ok(())
    }

    fn in_scope_count(block: &Block, scope: &TransactionScope) -> i64 {
        match BincodePayloadDecoder.decode(block.id, &block.payload) {
            Ok(txs) => txs.iter().filter(|tx| scope.matches(tx)).count() as i64,
            Err(_) => block.tx,
        }
    }

    async fn aggregate<T>(&self, value: T) -> Result<T, AppError> {
        self.check_should_fail()?;
        if self.should_panic.load(Ordering::SeqCst) {
            panic!("aggregate query panicked");
        }
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(value)
    }
}

impl Default for MockBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

const FEE_BURN_TOTAL: &str = "4200";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn holders() -> Vec<HolderBalance> {
    vec![
        HolderBalance {
            key_id: 7,
            amount: "5000000".to_string(),
        },
        HolderBalance {
            key_id: 3,
            amount: "1200".to_string(),
        },
    ]
}

fn daily_counts() -> Vec<DailyCount> {
    vec![
        DailyCount { day: day(1), count: 4 },
        DailyCount { day: day(2), count: 11 },
    ]
}

fn daily_amounts() -> Vec<DailyAmount> {
    vec![
        DailyAmount {
            day: day(1),
            amount: "1000".to_string(),
        },
        DailyAmount {
            day: day(2),
            amount: "3200".to_string(),
        },
    ]
}

fn contracts() -> Vec<ContractUsage> {
    vec![
        ContractUsage {
            contract_name: "TokensSend".to_string(),
            calls: 12,
        },
        ContractUsage {
            contract_name: "NewKey".to_string(),
            calls: 3,
        },
    ]
}

#[async_trait]
impl BlockStore for MockBlockStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn block_headers(
        &self,
        scope: &TransactionScope,
        order: SortOrder,
    ) -> Result<Vec<BlockHeader>, AppError> {
        self.check_should_fail()?;
        let mut headers: Vec<BlockHeader> = self
            .blocks
            .iter()
            .map(|block| BlockHeader {
                id: block.id,
                tx: Self::in_scope_count(block, scope),
                time: block.time,
            })
            .filter(|header| header.tx > 0)
            .collect();
        headers.sort_by_key(|header| header.id);
        if order == SortOrder::Desc {
            headers.reverse();
        }
        Ok(headers)
    }

    async fn blocks_by_ids(
        &self,
        scope: &TransactionScope,
        ids: &[i64],
    ) -> Result<Vec<Block>, AppError> {
        self.check_should_fail()?;
        self.fetched.lock().unwrap().push(ids.to_vec());
        Ok(ids
            .iter()
            .filter_map(|id| self.blocks.iter().find(|block| block.id == *id))
            .map(|block| Block {
                tx: Self::in_scope_count(block, scope),
                ..block.clone()
            })
            .collect())
    }

    async fn blocks_after(&self, after: i64, limit: i64) -> Result<Vec<Block>, AppError> {
        self.check_should_fail()?;
        let mut blocks: Vec<Block> = self
            .blocks
            .iter()
            .filter(|block| block.id > after)
            .cloned()
            .collect();
        blocks.sort_by_key(|block| block.id);
        blocks.truncate(limit.max(0) as usize);
        Ok(blocks)
    }

    async fn ecosystems(&self) -> Result<Vec<i64>, AppError> {
        self.check_should_fail()?;
        Ok(self.ecosystems.clone())
    }

    async fn holder_balances(
        &self,
        _ecosystem: i64,
        limit: i64,
    ) -> Result<Vec<HolderBalance>, AppError> {
        let mut rows = holders();
        rows.truncate(limit.max(0) as usize);
        self.aggregate(rows).await
    }

    async fn daily_transactions(
        &self,
        _ecosystem: i64,
        _days: i64,
    ) -> Result<Vec<DailyCount>, AppError> {
        self.aggregate(daily_counts()).await
    }

    async fn total_fee_burn(&self, _ecosystem: i64) -> Result<String, AppError> {
        self.aggregate(FEE_BURN_TOTAL.to_string()).await
    }

    async fn daily_fee_burn(
        &self,
        _ecosystem: i64,
        _days: i64,
    ) -> Result<Vec<DailyAmount>, AppError> {
        self.aggregate(daily_amounts()).await
    }

    async fn top_contracts(
        &self,
        _ecosystem: i64,
        limit: i64,
    ) -> Result<Vec<ContractUsage>, AppError> {
        let mut rows = contracts();
        rows.truncate(limit.max(0) as usize);
        self.aggregate(rows).await
    }
}

/// Cache mock backed by the in-memory cache, able to simulate an outage
pub struct MockCacheClient {
    inner: MemoryCacheClient,
    config: MockConfig,
}

impl MockCacheClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            inner: MemoryCacheClient::new(),
            config,
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Cache(CacheError::Connection(
                self.config.message(),
            )));
        }
        Ok(())
    }
}

impl Default for MockCacheClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheClient for MockCacheClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.check_should_fail()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        self.check_should_fail()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.inner.set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        self.check_should_fail()?;
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        self.check_should_fail()?;
        self.inner.delete(key).await
    }
}
