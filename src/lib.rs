//! Read path of a block explorer.
//!
//! Transaction listings are paginated over the concatenation of block
//! payloads, re-ingested transaction hashes are deduplicated in memory, and
//! aggregate charts are served from a cache kept warm by a bounded refresh
//! scheduler.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
