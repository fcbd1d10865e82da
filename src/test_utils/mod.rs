//! Test doubles and fixtures, compiled for tests and the `test-utils` feature.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{CountingDecoder, block_with_counts};
pub use mocks::{MockBlockStore, MockCacheClient, MockConfig};
