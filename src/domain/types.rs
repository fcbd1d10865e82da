//! Domain types for blocks, transaction views, charts and refresh signals.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Block record as served by the relational store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Monotonically increasing block id
    pub id: i64,
    /// Declared transaction count for the scope the block was selected under
    pub tx: i64,
    /// Unix timestamp of the block
    pub time: i64,
    /// Opaque serialized transaction list
    pub payload: Vec<u8>,
}

impl Block {
    #[must_use]
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            id: self.id,
            tx: self.tx,
            time: self.time,
        }
    }
}

/// Block without its payload, used for offset arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub id: i64,
    pub tx: i64,
    pub time: i64,
}

/// A single transaction record decoded from a block payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTransaction {
    pub hash: String,
    pub contract_name: String,
    pub key_id: i64,
    pub time: i64,
    pub size: u64,
    pub ecosystem: i64,
}

/// Reconstructed per-transaction view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TransactionView {
    /// Content hash of the transaction
    #[schema(example = "9f2c1e0b")]
    pub hash: String,
    /// Id of the block containing the transaction
    pub block_id: i64,
    /// Contract (operation) name
    #[schema(example = "TokensSend")]
    pub contract_name: String,
    /// Actor (key) identifier
    pub key_id: i64,
    /// Unix timestamp
    pub time: i64,
    /// Serialized size in bytes
    pub size: u64,
    /// Ecosystem (sub-ledger) id
    pub ecosystem: i64,
}

impl TransactionView {
    #[must_use]
    pub fn from_raw(block_id: i64, raw: RawTransaction) -> Self {
        Self {
            hash: raw.hash,
            block_id,
            contract_name: raw.contract_name,
            key_id: raw.key_id,
            time: raw.time,
            size: raw.size,
            ecosystem: raw.ecosystem,
        }
    }
}

/// Which transactions a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionScope {
    pub ecosystem: i64,
    pub actor: Option<i64>,
}

impl TransactionScope {
    #[must_use]
    pub fn ecosystem(ecosystem: i64) -> Self {
        Self {
            ecosystem,
            actor: None,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: i64) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Whether a decoded transaction belongs to this scope
    #[must_use]
    pub fn matches(&self, tx: &RawTransaction) -> bool {
        tx.ecosystem == self.ecosystem && self.actor.is_none_or(|actor| tx.key_id == actor)
    }
}

/// Block ordering of a listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query parameters for transaction listings
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionPageQuery {
    /// Ecosystem id
    #[validate(range(min = 1, message = "Ecosystem must be positive"))]
    #[schema(example = 1)]
    pub ecosystem: i64,
    /// Restrict to transactions of one actor
    pub actor: Option<i64>,
    /// 1-based page number
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    #[serde(default = "default_page")]
    #[schema(example = 1)]
    pub page: i64,
    /// Page size (1-100, default: 20)
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    #[serde(default = "default_limit")]
    #[schema(example = 20)]
    pub limit: i64,
    /// Block order (default: desc)
    #[serde(default)]
    pub order: SortOrder,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

impl TransactionPageQuery {
    #[must_use]
    pub fn scope(&self) -> TransactionScope {
        TransactionScope {
            ecosystem: self.ecosystem,
            actor: self.actor,
        }
    }
}

/// One page of reconstructed transactions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TransactionPage {
    /// Total transactions in scope across all blocks
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub items: Vec<TransactionView>,
}

/// Aggregate chart kinds, each with its own volatility class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    /// Top holder balances; invalidated by ingestion events only
    Holdings,
    /// Transactions per day
    Activity,
    /// Burned fees
    FeeBurn,
    /// Most called contracts
    TopContracts,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [
        ChartType::Holdings,
        ChartType::Activity,
        ChartType::FeeBurn,
        ChartType::TopContracts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Holdings => "holdings",
            Self::Activity => "activity",
            Self::FeeBurn => "fee_burn",
            Self::TopContracts => "top_contracts",
        }
    }

    /// Cache lifetime; `None` means the entry lives until explicitly invalidated.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        const HOUR: u64 = 3600;
        match self {
            Self::Holdings => None,
            Self::Activity => Some(Duration::from_secs(6 * HOUR)),
            Self::FeeBurn => Some(Duration::from_secs(3 * HOUR)),
            Self::TopContracts => Some(Duration::from_secs(12 * HOUR)),
        }
    }

    #[must_use]
    pub fn is_event_driven(&self) -> bool {
        self.ttl().is_none()
    }
}

impl std::str::FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "holdings" => Ok(Self::Holdings),
            "activity" => Ok(Self::Activity),
            "fee_burn" => Ok(Self::FeeBurn),
            "top_contracts" => Ok(Self::TopContracts),
            _ => Err(format!("Invalid chart type: {}", s)),
        }
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cache key of one chart for one entity, rendered as `<chart-type>-<entity-id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartKey {
    pub chart: ChartType,
    pub entity_id: i64,
}

impl ChartKey {
    #[must_use]
    pub fn new(chart: ChartType, entity_id: i64) -> Self {
        Self { chart, entity_id }
    }
}

impl std::fmt::Display for ChartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.chart, self.entity_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct HolderBalance {
    pub key_id: i64,
    /// Decimal amount rendered as a string
    #[schema(example = "1000000000000000000")]
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DailyAmount {
    pub day: NaiveDate,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub struct FeeBurnSummary {
    /// Total burned over the whole history
    pub total: String,
    pub daily: Vec<DailyAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ContractUsage {
    pub contract_name: String,
    pub calls: i64,
}

/// Computed chart payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ChartData {
    Holdings(Vec<HolderBalance>),
    Activity(Vec<DailyCount>),
    FeeBurn(FeeBurnSummary),
    TopContracts(Vec<ContractUsage>),
}

impl ChartData {
    /// Default value served while a chart is being computed
    #[must_use]
    pub fn empty(chart: ChartType) -> Self {
        match chart {
            ChartType::Holdings => Self::Holdings(Vec::new()),
            ChartType::Activity => Self::Activity(Vec::new()),
            ChartType::FeeBurn => Self::FeeBurn(FeeBurnSummary {
                total: "0".to_string(),
                daily: Vec::new(),
            }),
            ChartType::TopContracts => Self::TopContracts(Vec::new()),
        }
    }

    #[must_use]
    pub fn chart_type(&self) -> ChartType {
        match self {
            Self::Holdings(_) => ChartType::Holdings,
            Self::Activity(_) => ChartType::Activity,
            Self::FeeBurn(_) => ChartType::FeeBurn,
            Self::TopContracts(_) => ChartType::TopContracts,
        }
    }
}

/// Chart as returned to readers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ChartSnapshot {
    pub chart: ChartType,
    pub entity_id: i64,
    pub data: ChartData,
    /// False when the default value was served and a refresh was requested
    pub from_cache: bool,
}

/// Command carried by a refresh signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCommand {
    /// A reader missed the cache; recompute the key
    Start,
    /// A recomputation for the key finished (successfully or not)
    Done,
}

/// Coalescing signal consumed by the refresh worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    pub key: ChartKey,
    pub command: RefreshCommand,
}

impl RefreshRequest {
    #[must_use]
    pub fn start(key: ChartKey) -> Self {
        Self {
            key,
            command: RefreshCommand::Start,
        }
    }

    #[must_use]
    pub fn done(key: ChartKey) -> Self {
        Self {
            key,
            command: RefreshCommand::Done,
        }
    }
}

/// Result of feeding a hash into the dedup ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    New,
    Duplicate { original_block: i64 },
}

impl Observation {
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New)
    }
}

/// Record arriving in an ingestion batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestRecord {
    pub hash: String,
    pub block_id: i64,
    pub ecosystem: i64,
}

/// Outcome of an ingestion batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records seen for the first time, in input order
    pub accepted: Vec<IngestRecord>,
    pub duplicates: usize,
}

/// Outcome of pulling one batch of new blocks from the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestProgress {
    /// Blocks pulled
    pub blocks: usize,
    /// Highest block id pulled, `None` when nothing was new
    pub last_block: Option<i64>,
    pub report: IngestReport,
    /// Blocks skipped because their payload did not decode
    pub undecodable: Vec<i64>,
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some systems degraded but functional
    Degraded,
    /// Critical systems unavailable
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// Relational store health status
    pub database: HealthStatus,
    /// Cache service health status
    pub cache: HealthStatus,
    /// Chart refreshes currently holding an admission slot
    pub refreshes_in_flight: usize,
    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
    /// Application version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    /// The cache only degrades the service: reads fall back to defaults without it.
    #[must_use]
    pub fn new(database: HealthStatus, cache: HealthStatus, refreshes_in_flight: usize) -> Self {
        let status = match (&database, &cache) {
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            database,
            cache,
            refreshes_in_flight,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type identifier
    #[schema(example = "validation_error")]
    pub r#type: String,
    /// Human-readable error message
    #[schema(example = "Limit must be between 1 and 100")]
    pub message: String,
}
