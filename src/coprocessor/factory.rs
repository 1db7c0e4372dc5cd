//! Store construction
//!
//! Picks the backend from configuration. LMDB stores share one environment,
//! opened on first use.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::config::{SearchStoreConfig, StoreType};
use crate::lmdb::{LmdbDataStore, LmdbEnvironment};
use crate::observability::MetricsRegistry;
use crate::plan::CompiledPlan;
use crate::store::{DataStore, DataStoreSettings, MapDataStore};

use super::errors::CoprocessorResult;

pub struct DataStoreFactory {
    config: SearchStoreConfig,
    environment: Mutex<Option<Arc<LmdbEnvironment>>>,
    metrics: Arc<MetricsRegistry>,
}

impl DataStoreFactory {
    pub fn new(config: SearchStoreConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            environment: Mutex::new(None),
            metrics,
        }
    }

    pub fn config(&self) -> &SearchStoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Limits for a store: the table's own `max_results` when it sets any,
    /// otherwise the configured defaults.
    pub fn settings_for(&self, plan: &CompiledPlan) -> DataStoreSettings {
        let max_results = if plan.max_results().as_slice().is_empty() {
            self.config.default_max_results()
        } else {
            plan.max_results().clone()
        };
        DataStoreSettings {
            max_results,
            store_size: self.config.store_size(),
        }
    }

    pub fn create(
        &self,
        query_key: &str,
        component_id: &str,
        plan: Arc<CompiledPlan>,
    ) -> CoprocessorResult<Arc<dyn DataStore>> {
        let settings = self.settings_for(&plan);
        let name = format!("{}_{}_{}", query_key, component_id, Uuid::new_v4().simple());

        let store: Arc<dyn DataStore> = match self.config.store_type {
            StoreType::Map => Arc::new(MapDataStore::new(name, plan, settings, Arc::clone(&self.metrics))),
            StoreType::Lmdb => {
                let environment = self.environment()?;
                Arc::new(LmdbDataStore::new(
                    name,
                    plan,
                    settings,
                    &environment,
                    &self.config.lmdb,
                    Arc::clone(&self.metrics),
                )?)
            }
        };
        Ok(store)
    }

    fn environment(&self) -> CoprocessorResult<Arc<LmdbEnvironment>> {
        let mut guard = self.environment.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(environment) = guard.as_ref() {
            return Ok(Arc::clone(environment));
        }
        let environment = Arc::new(LmdbEnvironment::open(&self.config.lmdb)?);
        *guard = Some(Arc::clone(&environment));
        Ok(environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::plan::{FieldSettings, Sizes, TableSettings};
    use tempfile::TempDir;

    fn plan(max_results: Vec<usize>) -> Arc<CompiledPlan> {
        Arc::new(
            CompiledPlan::compile(&TableSettings {
                fields: vec![FieldSettings::new("v", Expression::field(0))],
                show_detail: true,
                max_results,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let factory = DataStoreFactory::new(SearchStoreConfig::default(), Arc::new(MetricsRegistry::new()));
        let settings = factory.settings_for(&plan(vec![]));
        assert_eq!(settings.max_results, Sizes::new(vec![1_000_000, 100, 10, 1]));

        let settings = factory.settings_for(&plan(vec![5]));
        assert_eq!(settings.max_results, Sizes::new(vec![5]));
    }

    #[test]
    fn test_creates_lmdb_stores_in_one_environment() {
        let dir = TempDir::new().unwrap();
        let mut config = SearchStoreConfig::default();
        config.store_type = StoreType::Lmdb;
        config.lmdb.path = dir.path().to_string_lossy().into_owned();
        config.lmdb.max_store_size_bytes = 64 * 1024 * 1024;
        let factory = DataStoreFactory::new(config, Arc::new(MetricsRegistry::new()));

        let first = factory.create("q", "table-1", plan(vec![])).unwrap();
        let second = factory.create("q", "table-2", plan(vec![])).unwrap();
        first.add(&[crate::expression::Val::Integer(1)]);
        assert_eq!(first.total_size(), 1);
        assert_eq!(second.total_size(), 0);
    }
}
