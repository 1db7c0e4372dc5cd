//! Observable events
//!
//! Events are explicit and typed. Each carries its own severity so call
//! sites only choose the fields.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,

    // Store lifecycle
    StoreCreated,
    StoreCompleted,
    StoreCleared,
    /// Ingestion stopped early because enough rows arrived
    StoreHasEnoughData,

    // Map store
    RowsEvicted,

    // LMDB store
    LmdbEnvironmentOpened,
    LmdbCommit,
    LmdbPutFailed,
    LmdbCommitFailed,
    LmdbReadFailed,
    LmdbWriterStopped,

    // Payload transfer
    PayloadWritten,
    PayloadRead,
    PayloadRejected,

    // Coprocessors
    CoprocessorsCreated,
    CoprocessorsCleared,
    ProducerCompleted,

    // Responses
    SearchTimedOut,
    ComponentResultFailed,
    ResponseCreated,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::StoreCreated => "STORE_CREATED",
            Event::StoreCompleted => "STORE_COMPLETED",
            Event::StoreCleared => "STORE_CLEARED",
            Event::StoreHasEnoughData => "STORE_HAS_ENOUGH_DATA",

            Event::RowsEvicted => "ROWS_EVICTED",

            Event::LmdbEnvironmentOpened => "LMDB_ENV_OPENED",
            Event::LmdbCommit => "LMDB_COMMIT",
            Event::LmdbPutFailed => "LMDB_PUT_FAILED",
            Event::LmdbCommitFailed => "LMDB_COMMIT_FAILED",
            Event::LmdbReadFailed => "LMDB_READ_FAILED",
            Event::LmdbWriterStopped => "LMDB_WRITER_STOPPED",

            Event::PayloadWritten => "PAYLOAD_WRITTEN",
            Event::PayloadRead => "PAYLOAD_READ",
            Event::PayloadRejected => "PAYLOAD_REJECTED",

            Event::CoprocessorsCreated => "COPROCESSORS_CREATED",
            Event::CoprocessorsCleared => "COPROCESSORS_CLEARED",
            Event::ProducerCompleted => "PRODUCER_COMPLETED",

            Event::SearchTimedOut => "SEARCH_TIMED_OUT",
            Event::ComponentResultFailed => "COMPONENT_RESULT_FAILED",
            Event::ResponseCreated => "RESPONSE_CREATED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::LmdbPutFailed
            | Event::LmdbCommitFailed
            | Event::LmdbReadFailed
            | Event::PayloadRejected
            | Event::ComponentResultFailed => Severity::Error,
            Event::SearchTimedOut => Severity::Warn,
            Event::RowsEvicted | Event::LmdbCommit | Event::ResponseCreated => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
