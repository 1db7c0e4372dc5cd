//! LMDB store errors

use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StoreError;

pub type LmdbResult<T> = Result<T, LmdbError>;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Malformed row key of {0} bytes")]
    MalformedRowKey(usize),

    #[error("Writer stopped for table {0}")]
    WriterStopped(String),
}

impl LmdbError {
    pub fn code(&self) -> &'static str {
        match self {
            LmdbError::Heed(_) => "SEARCHSTORE_LMDB_HEED",
            LmdbError::Io(_) => "SEARCHSTORE_LMDB_IO",
            LmdbError::Codec(_) => "SEARCHSTORE_LMDB_CODEC",
            LmdbError::MalformedRowKey(_) => "SEARCHSTORE_LMDB_MALFORMED_ROW_KEY",
            LmdbError::WriterStopped(_) => "SEARCHSTORE_LMDB_WRITER_STOPPED",
        }
    }
}

impl From<LmdbError> for StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::Codec(c) => StoreError::Codec(c),
            LmdbError::WriterStopped(table) => StoreError::Closed(table),
            other => StoreError::Storage(other.to_string()),
        }
    }
}
