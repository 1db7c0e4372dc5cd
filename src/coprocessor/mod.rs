//! Fan-out of one row stream to the stores of a search
//!
//! A search has one `Coprocessor` per result component, either a table store
//! or an event reference collector. `Coprocessors` feeds
//! every row to each of them, aggregates their completion, and moves their
//! contents between nodes as id-tagged payload chunks.

mod coprocessors;
mod errors;
mod events;
mod factory;
mod settings;

pub use coprocessors::{Coprocessor, CoprocessorKind, Coprocessors, ErrorConsumer};
pub use errors::{CoprocessorError, CoprocessorResult};
pub use events::{EventCoprocessor, EventRef, EventRefs, EventSettings};
pub use factory::DataStoreFactory;
pub use settings::{ComponentSettings, SearchSettings};
