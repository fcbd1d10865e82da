//! Block payload codec.
//!
//! Payloads are bincode-encoded `Vec<RawTransaction>` as written by the
//! chain indexer.

use crate::domain::{DecodeError, PayloadDecoder, RawTransaction};

/// Decoder for bincode block payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodePayloadDecoder;

impl PayloadDecoder for BincodePayloadDecoder {
    fn decode(&self, block_id: i64, payload: &[u8]) -> Result<Vec<RawTransaction>, DecodeError> {
        bincode::deserialize(payload).map_err(|e| DecodeError::Payload {
            block_id,
            message: e.to_string(),
        })
    }
}

/// Encode a transaction list the way block payloads are stored
pub fn encode_payload(transactions: &[RawTransaction]) -> Result<Vec<u8>, DecodeError> {
    bincode::serialize(transactions).map_err(|e| DecodeError::Payload {
        block_id: -1,
        message: e.to_string(),
    })
}
