//! Row ingestion shared by both store backends
//!
//! A row is turned into one entry per depth, from 0 down to the plan's
//! maximum depth. Filters run first, at depth 0, before any key is built.
//! Grouped depths key on the values of the fields grouped there; the detail
//! depth gets a fresh unique id per row.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::expression::{Generator, Val};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::plan::CompiledPlan;

use super::key::{next_unique_id, Key};
use super::item::Item;

/// One item to insert beneath `parent`.
#[derive(Debug, Clone)]
pub(crate) struct IngestEntry {
    pub parent: Key,
    pub item: Item,
}

pub(crate) struct Ingestor {
    name: String,
    plan: Arc<CompiledPlan>,
    /// Stop after this many rows when nothing sorts or groups
    fast_path_limit: Option<u64>,
    total: AtomicU64,
    has_enough_data: AtomicBool,
    metrics: Arc<MetricsRegistry>,
}

impl Ingestor {
    pub fn new(name: &str, plan: Arc<CompiledPlan>, first_depth_limit: usize, metrics: Arc<MetricsRegistry>) -> Self {
        let fast_path_limit = if !plan.has_sort() && !plan.depths().has_group() {
            Some(first_depth_limit as u64)
        } else {
            None
        };
        Self {
            name: name.to_string(),
            plan,
            fast_path_limit,
            total: AtomicU64::new(0),
            has_enough_data: AtomicBool::new(false),
            metrics,
        }
    }

    /// Build the per-depth entries for one row, or `None` if the row is
    /// filtered out or the store already has enough data.
    ///
    /// The fast-path limit is checked before the row is counted, so
    /// concurrent producers may each land one row past it.
    pub fn prepare(&self, row: &[Val]) -> Option<Vec<IngestEntry>> {
        if self.has_enough_data() {
            return None;
        }

        let generators: Vec<Option<Generator>> = self
            .plan
            .expressions()
            .iter()
            .map(|expression| {
                expression.as_ref().map(|expression| {
                    let mut generator = Generator::new(Arc::clone(expression));
                    generator.set(row);
                    generator
                })
            })
            .collect();

        for (field, generator) in self.plan.fields().iter().zip(&generators) {
            if let Some(filter) = &field.filter {
                let value = generator.as_ref().map(Generator::eval).unwrap_or_default();
                if !filter.matches(&value.to_string()) {
                    self.metrics.increment_rows_filtered();
                    return None;
                }
            }
        }

        let depths = self.plan.depths();
        let mut entries = Vec::with_capacity(depths.max_depth() + 1);
        let mut parent = Key::root();
        for depth in 0..=depths.max_depth() {
            let key = if depths.is_grouped(depth) {
                let values = depths
                    .group_indices(depth)
                    .iter()
                    .map(|index| generators[*index].as_ref().map(Generator::eval).unwrap_or_default())
                    .collect();
                parent.resolve_grouped(values)
            } else {
                parent.resolve_ungrouped(next_unique_id())
            };

            entries.push(IngestEntry {
                parent: std::mem::replace(&mut parent, key.clone()),
                item: Item::new(key, generators.clone()),
            });
        }

        self.metrics.increment_rows_added();
        self.record(entries.len() as u64);
        Some(entries)
    }

    /// Count one row arriving in a payload. Returns `false` without
    /// counting once the store has enough data; the row must then be dropped.
    pub fn admit_imported(&self) -> bool {
        if self.has_enough_data() {
            return false;
        }
        self.record(1);
        true
    }

    fn record(&self, rows: u64) {
        let total = self.total.fetch_add(rows, Ordering::Relaxed) + rows;
        if let Some(limit) = self.fast_path_limit {
            if total >= limit && !self.has_enough_data.swap(true, Ordering::Relaxed) {
                log_event(
                    Event::StoreHasEnoughData,
                    &[("store", &self.name), ("total", &total.to_string())],
                );
            }
        }
    }

    pub fn has_enough_data(&self) -> bool {
        self.has_enough_data.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.has_enough_data.store(false, Ordering::Relaxed);
    }
}
