//! CLI command implementations
//!
//! `search` runs a whole search on one node: it builds the stores from the
//! settings, feeds every input row through them, marks them complete and
//! prints the response for every component.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::SearchStoreConfig;
use crate::coprocessor::{Coprocessors, DataStoreFactory, ErrorConsumer, SearchSettings};
use crate::observability::{log_event, Event, Logger, MetricsRegistry};
use crate::plan::CompiledPlan;
use crate::response::{ResultRequest, SearchRequest, SearchResponseCreator, Store, DEFAULT_LENGTH};
use crate::store::CompletionState;

use super::args::Command;
use super::errors::CliResult;
use super::io::{open_rows, read_json, read_rows, write_error, write_response};

/// Window and expansion options for `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub offset: usize,
    pub length: Option<usize>,
    pub open_groups: Vec<String>,
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    match run_command(cli.command) {
        Ok(()) => Ok(()),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Search {
            config,
            settings,
            input,
            offset,
            length,
            open_groups,
        } => {
            let config = match config {
                Some(path) => SearchStoreConfig::load(&path)?,
                None => SearchStoreConfig::default(),
            };
            let settings: SearchSettings = read_json(&settings)?;
            let options = SearchOptions {
                offset,
                length,
                open_groups,
            };
            let response = search(&config, &settings, &input, &options)?;
            write_response(response)
        }
        Command::Explain { settings } => {
            let settings: SearchSettings = read_json(&settings)?;
            write_response(explain(&settings)?)
        }
    }
}

/// Run a search over the rows in `input` and return the response as JSON.
pub fn search(config: &SearchStoreConfig, settings: &SearchSettings, input: &Path, options: &SearchOptions) -> CliResult<Value> {
    Logger::set_min_severity(config.severity()?);
    log_event(
        Event::ConfigLoaded,
        &[
            ("store_type", &format!("{:?}", config.store_type)),
            ("query_key", &settings.query_key),
        ],
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let factory = DataStoreFactory::new(config.clone(), Arc::clone(&metrics));
    let coprocessors = Arc::new(Coprocessors::create(settings, &factory, Arc::new(ErrorConsumer::new()))?);

    let fed = feed(&coprocessors, input);
    if let Err(e) = &fed {
        coprocessors.error_consumer().add(e.to_string());
    }
    let complete = coprocessors.completion_consumer();
    complete(coprocessors.value_count());

    let creator = SearchResponseCreator::with_default_timeout(
        Arc::clone(&coprocessors) as Arc<dyn Store>,
        config.default_max_results(),
        config.default_timeout(),
    )
    .with_metrics(Arc::clone(&metrics));

    let range_length = options.length.unwrap_or(DEFAULT_LENGTH);
    let requests = settings
        .components
        .iter()
        .map(|component| {
            let mut request = ResultRequest::new(component.component_id.clone()).range(options.offset, range_length);
            for group in &options.open_groups {
                request = request.open_group(group.clone());
            }
            request
        })
        .collect();

    let response = creator.create(&SearchRequest::new(settings.query_key.clone(), requests));
    let snapshot = metrics.snapshot();
    creator.destroy();
    fed?;

    let mut events = serde_json::Map::new();
    for event_settings in &settings.events {
        if let Some(refs) = coprocessors.events(&event_settings.component_id) {
            events.insert(
                event_settings.component_id.clone(),
                json!({
                    "refs": serde_json::to_value(refs.refs())?,
                    "reached_limit": refs.reached_limit(),
                }),
            );
        }
    }

    Ok(json!({
        "response": serde_json::to_value(&response)?,
        "events": events,
        "rows_consumed": coprocessors.value_count(),
        "rows_added": snapshot.rows_added,
        "rows_filtered": snapshot.rows_filtered,
    }))
}

fn feed(coprocessors: &Coprocessors, input: &Path) -> CliResult<()> {
    let consume = coprocessors.values_consumer();
    for row in read_rows(open_rows(input)?) {
        consume(&row?);
    }
    Ok(())
}

/// Compile every component and describe its depths and sorts.
pub fn explain(settings: &SearchSettings) -> CliResult<Value> {
    let mut components = Vec::with_capacity(settings.components.len());
    for component in &settings.components {
        let plan = CompiledPlan::compile(&component.table)?;
        components.push(json!({
            "component_id": component.component_id,
            "extraction_pipeline": component.extraction_pipeline,
            "plan": plan.explain(),
        }));
    }
    Ok(json!({
        "query_key": settings.query_key,
        "components": components,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coprocessor::{ComponentSettings, EventSettings};
    use crate::expression::Expression;
    use crate::plan::{FieldSettings, SortDirection, TableSettings};
    use std::fs;
    use tempfile::TempDir;

    fn settings() -> SearchSettings {
        SearchSettings {
            query_key: "q1".to_string(),
            components: vec![ComponentSettings::new(
                "table-1",
                TableSettings {
                    fields: vec![
                        FieldSettings::new("host", Expression::field(0))
                            .grouped(0)
                            .sorted(0, SortDirection::Asc),
                        FieldSettings::new("count", Expression::count()),
                        FieldSettings::new("bytes", Expression::sum(Expression::field(1))),
                    ],
                    show_detail: true,
                    max_results: vec![],
                },
            )],
            events: vec![],
        }
    }

    #[test]
    fn test_search_over_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("rows.jsonl");
        fs::write(&input, "[\"b\", 10]\n[\"a\", 5]\n[\"b\", 1]\n").unwrap();

        let value = search(&SearchStoreConfig::default(), &settings(), &input, &SearchOptions::default()).unwrap();
        assert_eq!(value["rows_consumed"], 3);
        let response = &value["response"];
        assert_eq!(response["complete"], true);
        let rows = response["results"][0]["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["values"], json!(["a", "1", "5"]));
        assert_eq!(rows[1]["values"], json!(["b", "2", "11"]));
    }

    #[test]
    fn test_search_collects_events() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("rows.jsonl");
        fs::write(&input, "[2, 7]\n[1, 3]\n[1, 3]\n[3, 1]\n").unwrap();

        let mut settings = settings();
        settings.events = vec![EventSettings::new("events").limits(2, usize::MAX, usize::MAX)];
        let value = search(&SearchStoreConfig::default(), &settings, &input, &SearchOptions::default()).unwrap();
        let events = &value["events"]["events"];
        assert_eq!(
            events["refs"],
            json!([{"stream_id": 1, "event_id": 3}, {"stream_id": 2, "event_id": 7}])
        );
        assert_eq!(events["reached_limit"], true);
    }

    #[test]
    fn test_bad_row_surfaces_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("rows.jsonl");
        fs::write(&input, "[\"a\", 1]\nnot json\n").unwrap();
        let err = search(&SearchStoreConfig::default(), &settings(), &input, &SearchOptions::default()).unwrap_err();
        assert_eq!(err.code_str(), "SEARCHSTORE_CLI_INVALID_INPUT");
    }

    #[test]
    fn test_explain() {
        let value = explain(&settings()).unwrap();
        assert_eq!(value["components"][0]["plan"]["max_depth"], 1);
    }
}
