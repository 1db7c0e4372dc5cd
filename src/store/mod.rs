//! Result stores
//!
//! A `DataStore` ingests flat rows and maintains a bounded, grouped and
//! sorted tree of `Item`s keyed by hierarchical `Key`s. Two backends share
//! the ingestion rules in `ingest`:
//! - `MapDataStore` keeps everything on the heap
//! - `LmdbDataStore` (in `crate::lmdb`) keeps rows in a memory-mapped table
//!
//! Both can move their contents between nodes as length-prefixed payloads.

mod completion;
mod errors;
mod ingest;
mod item;
mod key;
mod map;
mod payload;

pub use completion::{CompletionLatch, CompletionState};
pub use errors::{StoreError, StoreResult};
pub use item::{Item, Items};
pub use key::{next_unique_id, Key, KeyPart};
pub use map::MapDataStore;
pub use payload::{read_frame, write_frame, PayloadBuilder, PayloadRows};

pub(crate) use ingest::{IngestEntry, Ingestor};

use crate::codec::{Input, Output};
use crate::expression::{SelectionHint, Val};
use crate::plan::{CompiledPlan, Sizes};

/// Size limits a store is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStoreSettings {
    /// Client-visible limits; depth 0 bounds the no-sort, no-group fast path
    pub max_results: Sizes,
    /// Children each parent retains, per depth
    pub store_size: Sizes,
}

impl Default for DataStoreSettings {
    fn default() -> Self {
        Self {
            max_results: Sizes::unlimited(),
            store_size: Sizes::unlimited(),
        }
    }
}

pub trait DataStore: Send + Sync {
    fn plan(&self) -> &CompiledPlan;

    /// Ingest one row. Never fails; rows that cannot be stored are dropped.
    fn add(&self, values: &[Val]);

    /// Children of the root.
    fn get(&self) -> StoreResult<Items> {
        self.get_children(&Key::root())
    }

    /// Ordered children of `parent`, bounded by the store size at that depth.
    fn get_children(&self, parent: &Key) -> StoreResult<Items>;

    /// Children of `parent` for resolving a selector. Backends may return
    /// only what `hint` needs.
    fn child_items(&self, parent: &Key, hint: SelectionHint) -> StoreResult<Vec<Item>>;

    /// Number of rows currently retained.
    fn size(&self) -> u64;

    /// Number of rows ever ingested across all depths, before trimming.
    fn total_size(&self) -> u64;

    /// Drop all contents and release any waiters.
    fn clear(&self);

    fn completion_state(&self) -> &dyn CompletionState;

    /// Move a slice of this store's contents into `output`. Rows written are
    /// removed from this store.
    fn write_payload(&self, output: &mut Output) -> StoreResult<()>;

    /// Merge a payload produced by a store of the same backend. Returns
    /// whether this store still accepts data.
    fn read_payload(&self, input: &mut Input<'_>) -> StoreResult<bool>;
}
