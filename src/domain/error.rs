//! Error taxonomy for the explorer read path.

use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Relational store errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

/// External cache service errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),
}

/// Payload decoding and block consistency errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Block {block_id} payload could not be decoded: {message}")]
    Payload { block_id: i64, message: String },

    #[error("Block {block_id} declares {declared} transactions but decodes to {decoded}")]
    CountMismatch {
        block_id: i64,
        declared: i64,
        decoded: usize,
    },

    #[error("Decoded page of {len} transactions cannot be trimmed by {start_trim}+{end_trim}")]
    Inconsistent {
        len: usize,
        start_trim: usize,
        end_trim: usize,
    },

    #[error("Block {0} is missing from the store")]
    MissingBlock(i64),
}

/// Request validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Validation failed: {0}")]
    Multiple(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_mismatch_message_names_block() {
        let err = AppError::from(DecodeError::CountMismatch {
            block_id: 42,
            declared: 3,
            decoded: 2,
        });
        let msg = err.to_string();
        assert!(msg.contains("Block 42"));
        assert!(msg.contains("declares 3"));
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }
}
