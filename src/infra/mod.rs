//! Infrastructure layer implementations.

pub mod cache;
pub mod codec;
pub mod database;
pub mod ledger;

pub use cache::{MemoryCacheClient, RedisCacheClient};
pub use codec::{BincodePayloadDecoder, encode_payload};
pub use database::{PostgresClient, PostgresConfig};
pub use ledger::HashLedger;
