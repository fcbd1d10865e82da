//! In-memory hash deduplication ledger.
//!
//! Remembers every transaction hash seen during the process lifetime together
//! with the block it was first seen in. The relational store stays the source
//! of truth; the ledger only suppresses reprocessing of re-ingested records.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::Observation;

/// Thread-safe first-writer-wins map from content hash to originating block id.
#[derive(Debug, Default)]
pub struct HashLedger {
    seen: DashMap<String, i64>,
}

impl HashLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash` as seen in `block_id`.
    ///
    /// The entry API holds the shard lock across the check and the insert, so
    /// concurrent observers of the same hash get exactly one `New`.
    pub fn observe(&self, hash: &str, block_id: i64) -> Observation {
        if let Some(original) = self.seen.get(hash) {
            return Observation::Duplicate {
                original_block: *original,
            };
        }
        match self.seen.entry(hash.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(block_id);
                Observation::New
            }
            Entry::Occupied(existing) => Observation::Duplicate {
                original_block: *existing.get(),
            },
        }
    }

    /// Block a hash was first seen in
    #[must_use]
    pub fn origin_of(&self, hash: &str) -> Option<i64> {
        self.seen.get(hash).map(|entry| *entry.value())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
