//! Coprocessor errors

use thiserror::Error;

use crate::codec::CodecError;
use crate::lmdb::LmdbError;
use crate::plan::PlanError;
use crate::store::StoreError;

pub type CoprocessorResult<T> = Result<T, CoprocessorError>;

#[derive(Debug, Error)]
pub enum CoprocessorError {
    #[error("Invalid table settings: {0}")]
    Plan(#[from] PlanError),

    #[error("Failed to create LMDB store: {0}")]
    Lmdb(#[from] LmdbError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Component {0} is configured more than once")]
    DuplicateComponent(String),

    #[error("Payload chunk for unknown coprocessor {0}")]
    UnknownCoprocessor(i32),
}

impl CoprocessorError {
    pub fn code(&self) -> &'static str {
        match self {
            CoprocessorError::Plan(e) => e.code(),
            CoprocessorError::Lmdb(e) => e.code(),
            CoprocessorError::Store(e) => e.code(),
            CoprocessorError::Codec(e) => e.code(),
            CoprocessorError::DuplicateComponent(_) => "SEARCHSTORE_COPROCESSOR_DUPLICATE_COMPONENT",
            CoprocessorError::UnknownCoprocessor(_) => "SEARCHSTORE_COPROCESSOR_UNKNOWN",
        }
    }
}
