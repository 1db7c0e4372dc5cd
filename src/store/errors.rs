//! Store errors

use thiserror::Error;

use crate::codec::CodecError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid group key: {0}")]
    InvalidGroupKey(String),

    #[error("Store closed: {0}")]
    Closed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Codec(_) => "SEARCHSTORE_STORE_CODEC",
            StoreError::InvalidGroupKey(_) => "SEARCHSTORE_STORE_INVALID_GROUP_KEY",
            StoreError::Closed(_) => "SEARCHSTORE_STORE_CLOSED",
            StoreError::Storage(_) => "SEARCHSTORE_STORE_STORAGE",
            StoreError::Timeout(_) => "SEARCHSTORE_STORE_TIMEOUT",
        }
    }
}
