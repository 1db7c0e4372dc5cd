//! Search responses
//!
//! `SearchResponseCreator` turns a `Store` (normally a `Coprocessors`) into
//! client responses: it waits for completion up to a timeout, shapes each
//! requested component into a `TableResult`, and skips results a client
//! already has when asked only for changes.

mod creator;
mod format;
mod request;
mod result;
mod table;

use std::sync::Arc;
use std::time::Duration;

use crate::store::DataStore;

pub use creator::{SearchResponseCreator, FALLBACK_DEFAULT_TIMEOUT};
pub use format::FieldFormatter;
pub use request::{Fetch, OffsetRange, ResultRequest, SearchRequest, DEFAULT_LENGTH};
pub use result::{Row, SearchResponse, TableResult};
pub use table::TableResultCreator;

/// What the response layer needs from a running search.
pub trait Store: Send + Sync {
    /// Stop the search and drop its data.
    fn destroy(&self);

    fn is_complete(&self) -> bool;

    /// Wait up to `timeout`; returns whether the search completed.
    fn await_completion(&self, timeout: Duration) -> bool;

    fn data(&self, component_id: &str) -> Option<Arc<dyn DataStore>>;

    fn errors(&self) -> Vec<String>;

    fn highlights(&self) -> Vec<String>;
}
