//! Shared fixtures for the store integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use searchstore::config::LmdbConfig;
use searchstore::expression::{Expression, Val};
use searchstore::lmdb::{LmdbDataStore, LmdbEnvironment};
use searchstore::observability::MetricsRegistry;
use searchstore::plan::{CompiledPlan, FieldSettings, Sizes, SortDirection, TableSettings};
use searchstore::store::{DataStore, DataStoreSettings, Item, MapDataStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Map,
    Lmdb,
}

pub const BACKENDS: [Backend; 2] = [Backend::Map, Backend::Lmdb];

/// A store plus whatever keeps its backing directory alive.
pub struct Fixture {
    pub store: Arc<dyn DataStore>,
    pub backend: Backend,
    _dir: Option<TempDir>,
}

impl Fixture {
    /// Wait until every row added so far is visible to readers.
    pub fn settle(&self) {
        let completion = self.store.completion_state();
        completion.signal_complete();
        assert!(completion.await_completion_timeout(Duration::from_secs(10)));
    }
}

pub fn lmdb_config(dir: &TempDir) -> LmdbConfig {
    LmdbConfig {
        path: dir.path().to_string_lossy().into_owned(),
        max_store_size_bytes: 64 * 1024 * 1024,
        max_dbs: 16,
        queue_capacity: 10_000,
        commit_interval_ms: 10,
        poll_interval_ms: 5,
        ..LmdbConfig::default()
    }
}

pub fn fixture(backend: Backend, table: TableSettings, settings: DataStoreSettings) -> Fixture {
    let plan = Arc::new(CompiledPlan::compile(&table).unwrap());
    let metrics = Arc::new(MetricsRegistry::new());
    match backend {
        Backend::Map => Fixture {
            store: Arc::new(MapDataStore::new("map-test", plan, settings, metrics)),
            backend,
            _dir: None,
        },
        Backend::Lmdb => {
            let dir = TempDir::new().unwrap();
            let config = lmdb_config(&dir);
            let env = LmdbEnvironment::open(&config).unwrap();
            let store = LmdbDataStore::new("lmdb-test", plan, settings, &env, &config, metrics).unwrap();
            Fixture {
                store: Arc::new(store),
                backend,
                _dir: Some(dir),
            }
        }
    }
}

pub fn settings(max_results: Vec<usize>, store_size: Vec<usize>) -> DataStoreSettings {
    DataStoreSettings {
        max_results: Sizes::new(max_results),
        store_size: Sizes::new(store_size),
    }
}

/// Grouped on column 0 (ascending) with count, sum, min and max of column 1.
pub fn grouped_table(show_detail: bool) -> TableSettings {
    TableSettings {
        fields: vec![
            FieldSettings::new("key", Expression::field(0))
                .grouped(0)
                .sorted(0, SortDirection::Asc),
            FieldSettings::new("count", Expression::count()),
            FieldSettings::new("sum", Expression::sum(Expression::field(1))),
            FieldSettings::new("min", Expression::min(Expression::field(1))),
            FieldSettings::new("max", Expression::max(Expression::field(1))),
        ],
        show_detail,
        max_results: vec![],
    }
}

pub fn value(item: &Item, index: usize) -> Val {
    item.generators()[index]
        .as_ref()
        .map(|g| g.eval())
        .unwrap_or_default()
}

pub fn group_values(store: &dyn DataStore) -> Vec<Val> {
    store.get().unwrap().iter().map(|item| value(item, 0)).collect()
}
