//! LMDB-backed result store
//!
//! - `env`: one shared environment per directory
//! - `codec`: row key and row value layouts
//! - `writer`: the single writer thread
//! - `store`: `LmdbDataStore`, the `DataStore` implementation

mod codec;
mod env;
mod errors;
mod store;
mod writer;

pub use env::{LmdbEnvironment, Table};
pub use errors::{LmdbError, LmdbResult};
pub use store::{LmdbCompletionState, LmdbDataStore};
