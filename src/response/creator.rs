//! Client-facing response policy
//!
//! Decides how long to wait for a store, which components to deliver, and
//! suppresses unchanged results for `CHANGES` fetches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::observability::{log_event, Event, MetricsRegistry};
use crate::plan::Sizes;

use super::request::{Fetch, ResultRequest, SearchRequest};
use super::result::{SearchResponse, TableResult};
use super::table::TableResultCreator;
use super::Store;

/// Wait used for synchronous requests when none is configured.
pub const FALLBACK_DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct SearchResponseCreator {
    store: Arc<dyn Store>,
    default_timeout: Duration,
    table_creator: TableResultCreator,
    /// Last result delivered per component
    result_cache: Mutex<HashMap<String, TableResult>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SearchResponseCreator {
    pub fn new(store: Arc<dyn Store>, default_max_results: Sizes) -> Self {
        Self::with_default_timeout(store, default_max_results, FALLBACK_DEFAULT_TIMEOUT)
    }

    pub fn with_default_timeout(store: Arc<dyn Store>, default_max_results: Sizes, default_timeout: Duration) -> Self {
        Self {
            store,
            default_timeout,
            table_creator: TableResultCreator::new(default_max_results),
            result_cache: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stop the search and drop all stored data.
    pub fn destroy(&self) {
        self.store.destroy();
    }

    /// An empty response carrying `errors`.
    pub fn error_response(errors: Vec<String>) -> SearchResponse {
        SearchResponse::error_response(errors)
    }

    pub fn create(&self, request: &SearchRequest) -> SearchResponse {
        if !self.store.is_complete() {
            let timeout = self.effective_timeout(request);
            let completed = self.store.await_completion(timeout);
            if !completed && !request.incremental {
                log_event(
                    Event::SearchTimedOut,
                    &[("key", &request.key), ("timeout_ms", &timeout.as_millis().to_string())],
                );
                let mut errors = vec![format!("The search timed out after {:?}", timeout)];
                errors.extend(self.store.errors());
                return SearchResponse::error_response(errors);
            }
        }

        // Read completion before results so a complete response never
        // misses rows.
        let complete = self.store.is_complete();
        let results = self.results(request);
        let errors = self.store.errors();

        if let Some(metrics) = &self.metrics {
            metrics.increment_responses_created();
        }
        log_event(
            Event::ResponseCreated,
            &[
                ("key", &request.key),
                ("results", &results.len().to_string()),
                ("complete", &complete.to_string()),
            ],
        );

        SearchResponse {
            highlights: self.store.highlights(),
            results: if results.is_empty() { None } else { Some(results) },
            errors: if errors.is_empty() { None } else { Some(errors) },
            complete,
        }
    }

    fn effective_timeout(&self, request: &SearchRequest) -> Duration {
        match request.timeout() {
            Some(timeout) => timeout,
            None if request.incremental => Duration::ZERO,
            None => self.default_timeout,
        }
    }

    fn results(&self, request: &SearchRequest) -> Vec<TableResult> {
        let mut results = Vec::with_capacity(request.result_requests.len());
        for result_request in &request.result_requests {
            if result_request.fetch == Fetch::None {
                continue;
            }
            let Some(result) = self.result(request, result_request) else {
                continue;
            };

            match result_request.fetch {
                Fetch::Changes => {
                    let mut cache = self.result_cache.lock().unwrap_or_else(|e| e.into_inner());
                    let previous = cache.insert(result_request.component_id.clone(), result.clone());
                    if previous.as_ref() != Some(&result) {
                        results.push(result);
                    }
                }
                _ => results.push(result),
            }
        }
        results
    }

    fn result(&self, request: &SearchRequest, result_request: &ResultRequest) -> Option<TableResult> {
        let store = self.store.data(&result_request.component_id)?;
        let result = self.table_creator.create(store.as_ref(), result_request);
        if let Some(error) = &result.error {
            log_event(
                Event::ComponentResultFailed,
                &[
                    ("key", &request.key),
                    ("component", &result_request.component_id),
                    ("reason", error),
                ],
            );
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Expression, Val};
    use crate::plan::{CompiledPlan, FieldSettings, SortDirection, TableSettings};
    use crate::store::{CompletionState, DataStore, DataStoreSettings, MapDataStore};

    struct SingleStore {
        store: Arc<MapDataStore>,
        errors: Vec<String>,
    }

    impl Store for SingleStore {
        fn destroy(&self) {
            self.store.clear();
        }

        fn is_complete(&self) -> bool {
            self.store.completion_state().is_complete()
        }

        fn await_completion(&self, timeout: Duration) -> bool {
            self.store.completion_state().await_completion_timeout(timeout)
        }

        fn data(&self, component_id: &str) -> Option<Arc<dyn DataStore>> {
            (component_id == "table").then(|| Arc::clone(&self.store) as Arc<dyn DataStore>)
        }

        fn errors(&self) -> Vec<String> {
            self.errors.clone()
        }

        fn highlights(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn map_store() -> Arc<MapDataStore> {
        let plan = CompiledPlan::compile(&TableSettings {
            fields: vec![
                FieldSettings::new("key", Expression::field(0))
                    .grouped(0)
                    .sorted(0, SortDirection::Asc),
                FieldSettings::new("count", Expression::count()),
            ],
            show_detail: false,
            max_results: vec![],
        })
        .unwrap();
        Arc::new(MapDataStore::new(
            "table",
            Arc::new(plan),
            DataStoreSettings::default(),
            Arc::new(MetricsRegistry::new()),
        ))
    }

    fn creator(store: Arc<MapDataStore>, errors: Vec<String>) -> SearchResponseCreator {
        SearchResponseCreator::with_default_timeout(
            Arc::new(SingleStore { store, errors }),
            Sizes::unlimited(),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_effective_timeout() {
        let creator = creator(map_store(), vec![]);
        let request = SearchRequest::new("q", vec![]);
        assert_eq!(creator.effective_timeout(&request), Duration::from_millis(20));
        assert_eq!(creator.effective_timeout(&request.clone().incremental(true)), Duration::ZERO);
        assert_eq!(
            creator.effective_timeout(&request.with_timeout(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_synchronous_timeout_is_error() {
        let creator = creator(map_store(), vec!["node down".to_string()]);
        let response = creator.create(&SearchRequest::new("q", vec![ResultRequest::new("table")]));
        assert!(!response.complete);
        assert!(response.results.is_none());
        let errors = response.errors.unwrap();
        assert!(errors[0].starts_with("The search timed out after"));
        assert_eq!(errors[1], "node down");
    }

    #[test]
    fn test_incremental_returns_partial() {
        let store = map_store();
        store.add(&[Val::from("A")]);
        let creator = creator(Arc::clone(&store), vec![]);
        let response = creator.create(&SearchRequest::new("q", vec![ResultRequest::new("table")]).incremental(true));
        assert!(!response.complete);
        assert_eq!(response.results().len(), 1);
        assert!(response.errors.is_none());
    }

    #[test]
    fn test_fetch_none_and_unknown_component_skipped() {
        let store = map_store();
        store.completion_state().signal_complete();
        let creator = creator(store, vec![]);
        let response = creator.create(&SearchRequest::new(
            "q",
            vec![
                ResultRequest::new("table").fetch(Fetch::None),
                ResultRequest::new("missing"),
            ],
        ));
        assert!(response.complete);
        assert!(response.results.is_none());
    }

    #[test]
    fn test_changes_only_when_different() {
        let store = map_store();
        store.add(&[Val::from("A")]);
        store.completion_state().signal_complete();
        let creator = creator(Arc::clone(&store), vec![]);
        let request = SearchRequest::new("q", vec![ResultRequest::new("table").fetch(Fetch::Changes)]);

        assert_eq!(creator.create(&request).results().len(), 1);
        assert!(creator.create(&request).results.is_none());

        store.add(&[Val::from("A")]);
        let response = creator.create(&request);
        assert_eq!(response.results().len(), 1);
        assert_eq!(response.results()[0].rows[0].values[1], Some("2".to_string()));
    }
}
