//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use std::time::Duration;

use super::error::{AppError, DecodeError};
use super::types::{
    Block, BlockHeader, ContractUsage, DailyAmount, DailyCount, HolderBalance, RawTransaction,
    SortOrder, TransactionScope,
};

/// Read-only access to the relational store holding blocks and aggregates
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Headers of every block holding transactions in `scope`, in `order`.
    /// `tx` is the count of in-scope transactions of each block.
    async fn block_headers(
        &self,
        scope: &TransactionScope,
        order: SortOrder,
    ) -> Result<Vec<BlockHeader>, AppError>;

    /// Full blocks (with payload) for the given ids, in the order of `ids`.
    /// Ids that do not exist are skipped.
    async fn blocks_by_ids(
        &self,
        scope: &TransactionScope,
        ids: &[i64],
    ) -> Result<Vec<Block>, AppError>;

    /// Up to `limit` blocks with id above `after`, ascending, across all scopes.
    /// `tx` is the block's total transaction count.
    async fn blocks_after(&self, after: i64, limit: i64) -> Result<Vec<Block>, AppError>;

    /// All ecosystem ids known to the store
    async fn ecosystems(&self) -> Result<Vec<i64>, AppError>;

    /// Largest balances of an ecosystem, descending
    async fn holder_balances(
        &self,
        ecosystem: i64,
        limit: i64,
    ) -> Result<Vec<HolderBalance>, AppError>;

    /// Transaction counts grouped by day for the last `days` days
    async fn daily_transactions(
        &self,
        ecosystem: i64,
        days: i64,
    ) -> Result<Vec<DailyCount>, AppError>;

    /// Total burned fees over the whole history
    async fn total_fee_burn(&self, ecosystem: i64) -> Result<String, AppError>;

    /// Burned fees grouped by day for the last `days` days
    async fn daily_fee_burn(&self, ecosystem: i64, days: i64)
    -> Result<Vec<DailyAmount>, AppError>;

    /// Most frequently called contracts, descending by call count
    async fn top_contracts(
        &self,
        ecosystem: i64,
        limit: i64,
    ) -> Result<Vec<ContractUsage>, AppError>;
}

/// External key-value cache service
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Check cache connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    /// Store `value`; `ttl = None` keeps it until deleted
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Returns `true` if a key was removed
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// Pure decoder from a block payload to its ordered transaction list
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, block_id: i64, payload: &[u8]) -> Result<Vec<RawTransaction>, DecodeError>;
}
