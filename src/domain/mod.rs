//! Domain layer containing core types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, CacheError, ConfigError, DatabaseError, DecodeError, ValidationError,
};
pub use traits::{BlockStore, CacheClient, PayloadDecoder};
pub use types::{
    Block, BlockHeader, ChartData, ChartKey, ChartSnapshot, ChartType, ContractUsage, DailyAmount,
    DailyCount, ErrorDetail, ErrorResponse, FeeBurnSummary, HealthResponse, HealthStatus,
    HolderBalance, IngestProgress, IngestRecord, IngestReport, Observation, RawTransaction, RefreshCommand,
    RefreshRequest, SortOrder, TransactionPage, TransactionPageQuery, TransactionScope,
    TransactionView,
};
