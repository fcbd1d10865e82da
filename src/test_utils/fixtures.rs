//! Block fixtures and an instrumented decoder.

use std::sync::Mutex;

use crate::domain::{Block, DecodeError, PayloadDecoder, RawTransaction};
use crate::infra::{BincodePayloadDecoder, encode_payload};

/// Bincode decoder that records which blocks it was asked to decode
#[derive(Debug, Default)]
pub struct CountingDecoder {
    decoded: Mutex<Vec<i64>>,
}

impl CountingDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded block ids, in call order
    pub fn decoded_blocks(&self) -> Vec<i64> {
        self.decoded.lock().unwrap().clone()
    }
}

impl PayloadDecoder for CountingDecoder {
    fn decode(&self, block_id: i64, payload: &[u8]) -> Result<Vec<RawTransaction>, DecodeError> {
        self.decoded.lock().unwrap().push(block_id);
        BincodePayloadDecoder.decode(block_id, payload)
    }
}

/// Blocks with ids `1..=counts.len()`, block `i` holding `counts[i - 1]`
/// transactions of `ecosystem` hashed `b<id>-t<n>`.
pub fn block_with_counts(counts: &[i64], ecosystem: i64) -> Vec<Block> {
    counts
        .iter()
        .enumerate()
        .map(|(position, count)| {
            let id = position as i64 + 1;
            let time = 1_700_000_000 + id * 10;
            let txs: Vec<RawTransaction> = (0..*count)
                .map(|n| RawTransaction {
                    hash: format!("b{}-t{}", id, n),
                    contract_name: if n % 2 == 0 { "TokensSend" } else { "NewKey" }.to_string(),
                    key_id: n % 3 + 1,
                    time,
                    size: 100 + n as u64,
                    ecosystem,
                })
                .collect();
            Block {
                id,
                tx: *count,
                time,
                payload: encode_payload(&txs).unwrap(),
            }
        })
        .collect()
}
