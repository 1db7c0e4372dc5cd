use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::codec::{CodecError, Input, Output};
use crate::expression::Val;
use crate::observability::{log_event, Event, Logger, Severity};
use crate::plan::CompiledPlan;
use crate::response::Store;
use crate::store::{CompletionState, DataStore, StoreResult};

use super::errors::{CoprocessorError, CoprocessorResult};
use super::events::{EventCoprocessor, EventRefs};
use super::factory::DataStoreFactory;
use super::settings::SearchSettings;

/// Collects error messages raised while a search runs. Repeats are dropped.
#[derive(Debug, Default)]
pub struct ErrorConsumer {
    errors: Mutex<Vec<String>>,
}

impl ErrorConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, error: impl Into<String>) {
        let error = error.into();
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        if !errors.contains(&error) {
            errors.push(error);
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

/// What a coprocessor collects.
#[derive(Clone)]
pub enum CoprocessorKind {
    /// A result table
    Table(Arc<dyn DataStore>),
    /// Stream and event references
    Events(Arc<EventCoprocessor>),
}

/// A table store or event collector plus its routing metadata.
pub struct Coprocessor {
    id: i32,
    component_id: String,
    extraction_pipeline: Option<String>,
    kind: CoprocessorKind,
}

impl Coprocessor {
    pub fn new(
        id: i32,
        component_id: impl Into<String>,
        extraction_pipeline: Option<String>,
        store: Arc<dyn DataStore>,
    ) -> Self {
        Self {
            id,
            component_id: component_id.into(),
            extraction_pipeline,
            kind: CoprocessorKind::Table(store),
        }
    }

    /// Event coprocessors take rows from the main stream only.
    pub fn events(id: i32, events: EventCoprocessor) -> Self {
        Self {
            id,
            component_id: events.settings().component_id.clone(),
            extraction_pipeline: None,
            kind: CoprocessorKind::Events(Arc::new(events)),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    pub fn extraction_pipeline(&self) -> Option<&str> {
        self.extraction_pipeline.as_deref()
    }

    pub fn kind(&self) -> &CoprocessorKind {
        &self.kind
    }

    pub fn store(&self) -> Option<&Arc<dyn DataStore>> {
        match &self.kind {
            CoprocessorKind::Table(store) => Some(store),
            CoprocessorKind::Events(_) => None,
        }
    }

    pub fn event_collector(&self) -> Option<&Arc<EventCoprocessor>> {
        match &self.kind {
            CoprocessorKind::Events(events) => Some(events),
            CoprocessorKind::Table(_) => None,
        }
    }

    pub fn accept(&self, values: &[Val]) {
        match &self.kind {
            CoprocessorKind::Table(store) => store.add(values),
            CoprocessorKind::Events(events) => events.accept(values),
        }
    }

    pub fn completion_state(&self) -> &dyn CompletionState {
        match &self.kind {
            CoprocessorKind::Table(store) => store.completion_state(),
            CoprocessorKind::Events(events) => events.completion_state(),
        }
    }

    pub fn clear(&self) {
        match &self.kind {
            CoprocessorKind::Table(store) => store.clear(),
            CoprocessorKind::Events(events) => events.clear(),
        }
    }

    pub fn write_payload(&self, output: &mut Output) -> StoreResult<()> {
        match &self.kind {
            CoprocessorKind::Table(store) => store.write_payload(output),
            CoprocessorKind::Events(events) => events.write_payload(output),
        }
    }

    pub fn read_payload(&self, input: &mut Input<'_>) -> StoreResult<bool> {
        match &self.kind {
            CoprocessorKind::Table(store) => store.read_payload(input),
            CoprocessorKind::Events(events) => events.read_payload(input),
        }
    }
}

/// Fan-out of one row stream to every table in a search.
///
/// Coprocessor ids are assigned in component order starting at zero, with
/// event components numbered after the tables, so the same settings on two
/// nodes give matching ids for payload routing.
pub struct Coprocessors {
    query_key: String,
    coprocessors: BTreeMap<i32, Arc<Coprocessor>>,
    by_component: HashMap<String, Arc<Coprocessor>>,
    by_pipeline: HashMap<String, Vec<Arc<Coprocessor>>>,
    counter: AtomicU64,
    errors: Arc<ErrorConsumer>,
}

impl Coprocessors {
    pub fn new(query_key: impl Into<String>, coprocessors: Vec<Coprocessor>, errors: Arc<ErrorConsumer>) -> CoprocessorResult<Self> {
        let mut map = BTreeMap::new();
        let mut by_component = HashMap::new();
        let mut by_pipeline: HashMap<String, Vec<Arc<Coprocessor>>> = HashMap::new();

        for coprocessor in coprocessors {
            let coprocessor = Arc::new(coprocessor);
            if by_component
                .insert(coprocessor.component_id.clone(), Arc::clone(&coprocessor))
                .is_some()
            {
                return Err(CoprocessorError::DuplicateComponent(coprocessor.component_id.clone()));
            }
            if let Some(pipeline) = &coprocessor.extraction_pipeline {
                by_pipeline
                    .entry(pipeline.clone())
                    .or_default()
                    .push(Arc::clone(&coprocessor));
            }
            map.insert(coprocessor.id, coprocessor);
        }

        Ok(Self {
            query_key: query_key.into(),
            coprocessors: map,
            by_component,
            by_pipeline,
            counter: AtomicU64::new(0),
            errors,
        })
    }

    /// Compile each component's table and create its store.
    pub fn create(settings: &SearchSettings, factory: &DataStoreFactory, errors: Arc<ErrorConsumer>) -> CoprocessorResult<Self> {
        let mut coprocessors = Vec::with_capacity(settings.components.len());
        for (id, component) in settings.components.iter().enumerate() {
            let plan = Arc::new(CompiledPlan::compile(&component.table)?);
            let store = factory.create(&settings.query_key, &component.component_id, plan)?;
            let id = i32::try_from(id).map_err(|_| CodecError::LengthOverflow(id))?;
            coprocessors.push(Coprocessor::new(
                id,
                component.component_id.clone(),
                component.extraction_pipeline.clone(),
                store,
            ));
        }

        for (offset, event_settings) in settings.events.iter().enumerate() {
            let id = settings.components.len() + offset;
            let id = i32::try_from(id).map_err(|_| CodecError::LengthOverflow(id))?;
            coprocessors.push(Coprocessor::events(id, EventCoprocessor::new(event_settings.clone())));
        }

        let coprocessors = Self::new(settings.query_key.clone(), coprocessors, errors)?;
        log_event(
            Event::CoprocessorsCreated,
            &[
                ("query_key", &coprocessors.query_key),
                ("count", &coprocessors.size().to_string()),
            ],
        );
        Ok(coprocessors)
    }

    pub fn query_key(&self) -> &str {
        &self.query_key
    }

    /// Give one row to every coprocessor.
    pub fn accept(&self, values: &[Val]) {
        self.counter.fetch_add(1, Ordering::Relaxed);
        if Logger::enabled(Severity::Trace) {
            Logger::trace("ROW_ACCEPTED", &[("query_key", &self.query_key), ("width", &values.len().to_string())]);
        }
        for coprocessor in self.coprocessors.values() {
            coprocessor.accept(values);
        }
    }

    pub fn values_consumer(&self) -> impl Fn(&[Val]) + '_ {
        move |values| self.accept(values)
    }

    /// Give one row produced by `pipeline` to the coprocessors that use it.
    pub fn accept_from_pipeline(&self, pipeline: &str, values: &[Val]) {
        if let Some(coprocessors) = self.by_pipeline.get(pipeline) {
            self.counter.fetch_add(1, Ordering::Relaxed);
            for coprocessor in coprocessors {
                coprocessor.accept(values);
            }
        }
    }

    /// Called once the producer has sent its last row, with the number of
    /// rows it sent. Every coprocessor is marked complete.
    pub fn completion_consumer(&self) -> impl Fn(u64) + '_ {
        move |count| {
            log_event(
                Event::ProducerCompleted,
                &[("query_key", &self.query_key), ("count", &count.to_string())],
            );
            self.signal_complete();
        }
    }

    pub fn extraction_pipelines(&self) -> impl Iterator<Item = (&str, &[Arc<Coprocessor>])> {
        self.by_pipeline
            .iter()
            .map(|(pipeline, coprocessors)| (pipeline.as_str(), coprocessors.as_slice()))
    }

    pub fn value_count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn error_consumer(&self) -> &Arc<ErrorConsumer> {
        &self.errors
    }

    pub fn completion_state(&self) -> &dyn CompletionState {
        self
    }

    /// Write one chunk per coprocessor, each tagged with its id.
    pub fn write_payloads(&self, output: &mut Output) -> StoreResult<()> {
        let count = i32::try_from(self.coprocessors.len())
            .map_err(|_| CodecError::LengthOverflow(self.coprocessors.len()))?;
        output.write_i32(count);
        for (id, coprocessor) in &self.coprocessors {
            output.write_i32(*id);
            coprocessor.write_payload(output)?;
        }
        Ok(())
    }

    /// Route each chunk to its coprocessor. Returns whether any coprocessor
    /// still accepts data; an empty frame means the sender had nothing yet,
    /// so polling should continue.
    pub fn read_payloads(&self, input: &mut Input<'_>) -> CoprocessorResult<bool> {
        let chunks = input.read_count()?;
        if chunks == 0 {
            return Ok(true);
        }

        let mut accepted = false;
        for _ in 0..chunks {
            let id = input.read_i32()?;
            let coprocessor = self
                .coprocessors
                .get(&id)
                .ok_or(CoprocessorError::UnknownCoprocessor(id))?;
            if coprocessor.read_payload(input)? {
                accepted = true;
            }
        }
        Ok(accepted)
    }

    pub fn clear(&self) {
        for coprocessor in self.coprocessors.values() {
            coprocessor.completion_state().signal_complete();
            coprocessor.clear();
        }
        log_event(Event::CoprocessorsCleared, &[("query_key", &self.query_key)]);
    }

    pub fn get(&self, id: i32) -> Option<&Arc<Coprocessor>> {
        self.coprocessors.get(&id)
    }

    /// The table store of a component. Event components have none.
    pub fn data(&self, component_id: &str) -> Option<Arc<dyn DataStore>> {
        self.by_component
            .get(component_id)
            .and_then(|coprocessor| coprocessor.store())
            .cloned()
    }

    pub fn events(&self, component_id: &str) -> Option<EventRefs> {
        self.by_component
            .get(component_id)
            .and_then(|coprocessor| coprocessor.event_collector())
            .map(|events| events.event_refs())
    }

    pub fn size(&self) -> usize {
        self.coprocessors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Coprocessor>> {
        self.coprocessors.values()
    }
}

impl CompletionState for Coprocessors {
    fn signal_complete(&self) {
        for coprocessor in self.coprocessors.values() {
            coprocessor.completion_state().signal_complete();
        }
    }

    fn is_complete(&self) -> bool {
        self.coprocessors
            .values()
            .all(|coprocessor| coprocessor.completion_state().is_complete())
    }

    fn await_completion(&self) {
        for coprocessor in self.coprocessors.values() {
            coprocessor.completion_state().await_completion();
        }
    }

    /// All coprocessors share one deadline.
    fn await_completion_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.coprocessors.values().all(|coprocessor| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            coprocessor
                .completion_state()
                .await_completion_timeout(remaining)
        })
    }
}

impl Store for Coprocessors {
    fn destroy(&self) {
        self.clear();
    }

    fn is_complete(&self) -> bool {
        CompletionState::is_complete(self)
    }

    fn await_completion(&self, timeout: Duration) -> bool {
        self.await_completion_timeout(timeout)
    }

    fn data(&self, component_id: &str) -> Option<Arc<dyn DataStore>> {
        Coprocessors::data(self, component_id)
    }

    fn errors(&self) -> Vec<String> {
        self.errors.errors()
    }

    fn highlights(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchStoreConfig;
    use crate::coprocessor::{ComponentSettings, EventRef, EventSettings};
    use crate::expression::Expression;
    use crate::observability::MetricsRegistry;
    use crate::plan::{FieldSettings, SortDirection, TableSettings};

    fn table() -> TableSettings {
        TableSettings {
            fields: vec![
                FieldSettings::new("key", Expression::field(0))
                    .grouped(0)
                    .sorted(0, SortDirection::Asc),
                FieldSettings::new("count", Expression::count()),
            ],
            show_detail: false,
            max_results: vec![],
        }
    }

    fn coprocessors(components: Vec<ComponentSettings>) -> Coprocessors {
        let factory = DataStoreFactory::new(SearchStoreConfig::default(), Arc::new(MetricsRegistry::new()));
        let settings = SearchSettings {
            query_key: "q1".to_string(),
            components,
            events: vec![],
        };
        Coprocessors::create(&settings, &factory, Arc::new(ErrorConsumer::new())).unwrap()
    }

    #[test]
    fn test_rows_fan_out_to_every_store() {
        let coprocessors = coprocessors(vec![
            ComponentSettings::new("a", table()),
            ComponentSettings::new("b", table()),
        ]);
        let consume = coprocessors.values_consumer();
        consume(&[Val::from("x")]);
        consume(&[Val::from("y")]);

        assert_eq!(coprocessors.value_count(), 2);
        assert_eq!(coprocessors.data("a").unwrap().get().unwrap().len(), 2);
        assert_eq!(coprocessors.data("b").unwrap().get().unwrap().len(), 2);
        assert!(coprocessors.data("missing").is_none());
    }

    #[test]
    fn test_pipeline_routing() {
        let coprocessors = coprocessors(vec![
            ComponentSettings::new("a", table()).with_pipeline("p1"),
            ComponentSettings::new("b", table()).with_pipeline("p2"),
        ]);
        coprocessors.accept_from_pipeline("p1", &[Val::from("x")]);
        assert_eq!(coprocessors.data("a").unwrap().total_size(), 1);
        assert_eq!(coprocessors.data("b").unwrap().total_size(), 0);
        assert_eq!(coprocessors.extraction_pipelines().count(), 2);
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let factory = DataStoreFactory::new(SearchStoreConfig::default(), Arc::new(MetricsRegistry::new()));
        let settings = SearchSettings {
            query_key: "q1".to_string(),
            components: vec![ComponentSettings::new("a", table()), ComponentSettings::new("a", table())],
            events: vec![],
        };
        let err = Coprocessors::create(&settings, &factory, Arc::new(ErrorConsumer::new()))
            .err()
            .unwrap();
        assert!(matches!(err, CoprocessorError::DuplicateComponent(_)));
    }

    #[test]
    fn test_completion_is_aggregate() {
        let coprocessors = coprocessors(vec![
            ComponentSettings::new("a", table()),
            ComponentSettings::new("b", table()),
        ]);
        assert!(!CompletionState::is_complete(&coprocessors));
        coprocessors.data("a").unwrap().completion_state().signal_complete();
        assert!(!CompletionState::is_complete(&coprocessors));
        assert!(!coprocessors.await_completion_timeout(Duration::from_millis(10)));

        coprocessors.signal_complete();
        assert!(CompletionState::is_complete(&coprocessors));
        assert!(coprocessors.await_completion_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_payloads_route_by_id() {
        let source = coprocessors(vec![
            ComponentSettings::new("a", table()),
            ComponentSettings::new("b", table()),
        ]);
        source.accept(&[Val::from("x")]);
        source.accept(&[Val::from("x")]);

        let mut out = Output::new();
        source.write_payloads(&mut out).unwrap();
        let bytes = out.into_bytes();

        let target = coprocessors(vec![
            ComponentSettings::new("a", table()),
            ComponentSettings::new("b", table()),
        ]);
        assert!(target.read_payloads(&mut Input::new(&bytes)).unwrap());
        let items = target.data("b").unwrap().get().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items.get(0).unwrap().generators()[1].as_ref().unwrap().eval(), Val::Integer(2));
    }

    #[test]
    fn test_empty_frame_keeps_polling() {
        let coprocessors = coprocessors(vec![ComponentSettings::new("a", table())]);
        let mut out = Output::new();
        out.write_i32(0);
        let bytes = out.into_bytes();
        assert!(coprocessors.read_payloads(&mut Input::new(&bytes)).unwrap());
    }

    #[test]
    fn test_unknown_chunk_rejected() {
        let coprocessors = coprocessors(vec![ComponentSettings::new("a", table())]);
        let mut out = Output::new();
        out.write_i32(1);
        out.write_i32(7);
        let bytes = out.into_bytes();
        assert!(matches!(
            coprocessors.read_payloads(&mut Input::new(&bytes)),
            Err(CoprocessorError::UnknownCoprocessor(7))
        ));
    }

    fn with_events(events: Vec<EventSettings>) -> Coprocessors {
        let factory = DataStoreFactory::new(SearchStoreConfig::default(), Arc::new(MetricsRegistry::new()));
        let settings = SearchSettings {
            query_key: "q1".to_string(),
            components: vec![ComponentSettings::new("a", table())],
            events,
        };
        Coprocessors::create(&settings, &factory, Arc::new(ErrorConsumer::new())).unwrap()
    }

    #[test]
    fn test_event_components_follow_tables() {
        let coprocessors = with_events(vec![EventSettings::new("events")]);
        assert_eq!(coprocessors.size(), 2);
        assert!(coprocessors.get(0).unwrap().store().is_some());
        assert_eq!(coprocessors.get(1).unwrap().component_id(), "events");
        assert!(coprocessors.data("events").is_none());
        assert!(coprocessors.events("a").is_none());

        coprocessors.accept(&[Val::Integer(4), Val::Integer(9)]);
        coprocessors.accept(&[Val::Integer(4), Val::Integer(2)]);
        let refs = coprocessors.events("events").unwrap();
        assert_eq!(refs.refs(), &[EventRef::new(4, 2), EventRef::new(4, 9)]);
        assert_eq!(coprocessors.data("a").unwrap().total_size(), 2);
    }

    #[test]
    fn test_event_and_table_payloads_route_together() {
        let source = with_events(vec![EventSettings::new("events")]);
        source.accept(&[Val::Integer(1), Val::Integer(5)]);
        source.accept(&[Val::Integer(2), Val::Integer(3)]);

        let mut out = Output::new();
        source.write_payloads(&mut out).unwrap();
        let bytes = out.into_bytes();

        let target = with_events(vec![EventSettings::new("events")]);
        assert!(target.read_payloads(&mut Input::new(&bytes)).unwrap());
        assert_eq!(
            target.events("events").unwrap().refs(),
            &[EventRef::new(1, 5), EventRef::new(2, 3)]
        );
        assert_eq!(target.data("a").unwrap().total_size(), 2);
        assert!(source.events("events").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_across_kinds_rejected() {
        let factory = DataStoreFactory::new(SearchStoreConfig::default(), Arc::new(MetricsRegistry::new()));
        let settings = SearchSettings {
            query_key: "q1".to_string(),
            components: vec![ComponentSettings::new("a", table())],
            events: vec![EventSettings::new("a")],
        };
        let err = Coprocessors::create(&settings, &factory, Arc::new(ErrorConsumer::new()))
            .err()
            .unwrap();
        assert!(matches!(err, CoprocessorError::DuplicateComponent(_)));
    }

    #[test]
    fn test_completion_consumer_completes_every_coprocessor() {
        let coprocessors = with_events(vec![EventSettings::new("events")]);
        assert!(!CompletionState::is_complete(&coprocessors));

        let complete = coprocessors.completion_consumer();
        complete(0);
        assert!(CompletionState::is_complete(&coprocessors));
        assert!(coprocessors.data("a").unwrap().completion_state().is_complete());
        assert!(coprocessors.await_completion_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_error_consumer_deduplicates() {
        let errors = ErrorConsumer::new();
        errors.add("bad row");
        errors.add("bad row");
        errors.add("other");
        assert_eq!(errors.errors(), vec!["bad row".to_string(), "other".to_string()]);
    }
}
