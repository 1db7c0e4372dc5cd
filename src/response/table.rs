//! Table result shaping
//!
//! Walks a store from the root in stored order. Every visited row takes a
//! position; rows whose position falls inside the requested window are
//! formatted and returned. Open groups are expanded in place, directly after
//! their parent row.

use std::collections::HashSet;

use crate::plan::{CompiledField, Sizes};
use crate::store::{DataStore, Items, StoreResult};

use super::format::FieldFormatter;
use super::request::{OffsetRange, ResultRequest, DEFAULT_LENGTH};
use super::result::{Row, TableResult};

pub struct TableResultCreator {
    formatter: FieldFormatter,
    default_max_results: Sizes,
}

struct Walk<'a> {
    store: &'a dyn DataStore,
    fields: &'a [CompiledField],
    max_results: Sizes,
    offset: usize,
    length: usize,
    open_groups: HashSet<&'a str>,
}

impl TableResultCreator {
    pub fn new(default_max_results: Sizes) -> Self {
        Self {
            formatter: FieldFormatter::new(),
            default_max_results,
        }
    }

    /// Rows gathered before a store error are kept alongside the error.
    pub fn create(&self, store: &dyn DataStore, request: &ResultRequest) -> TableResult {
        let range = request.range.unwrap_or_default();
        let fields = store.plan().fields();
        let requested = match &request.max_results {
            Some(sizes) => Sizes::new(sizes.clone()),
            None => store.plan().max_results().clone(),
        };

        let walk = Walk {
            store,
            fields,
            max_results: Sizes::min(&requested, &self.default_max_results),
            offset: range.offset,
            length: if range.length == 0 { DEFAULT_LENGTH } else { range.length },
            open_groups: request.open_groups.iter().map(String::as_str).collect(),
        };

        let mut rows = Vec::new();
        let outcome = store
            .get()
            .and_then(|items| self.add_rows(&walk, &items, 0, 0, &mut rows));
        let (total_results, error) = match outcome {
            Ok(total) => (total, None),
            Err(e) => (rows.len(), Some(e.to_string())),
        };

        TableResult {
            component_id: request.component_id.clone(),
            fields: fields.iter().map(|field| field.name.clone()).collect(),
            result_range: OffsetRange::new(range.offset, rows.len()),
            rows,
            total_results,
            error,
        }
    }

    fn add_rows(
        &self,
        walk: &Walk<'_>,
        items: &Items,
        depth: usize,
        position: usize,
        rows: &mut Vec<Row>,
    ) -> StoreResult<usize> {
        let mut position = position;
        for item in items.iter().take(walk.max_results.size(depth)) {
            let group_key = if item.key().is_grouped() {
                Some(item.key().to_encoded_string()?)
            } else {
                None
            };

            if position >= walk.offset && rows.len() < walk.length {
                let mut values = Vec::with_capacity(walk.fields.len());
                for (index, field) in walk.fields.iter().enumerate() {
                    let val = item.value(index, walk.store)?;
                    values.push(self.formatter.format(&field.format, &val));
                }
                rows.push(Row {
                    group_key: group_key.clone(),
                    values,
                    depth: item.depth(),
                });
            }
            position += 1;

            if let Some(group_key) = &group_key {
                if walk.open_groups.contains(group_key.as_str()) {
                    let children = walk.store.get_children(item.key())?;
                    position = self.add_rows(walk, &children, depth + 1, position, rows)?;
                }
            }
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::expression::{Expression, SelectorKind, Val};
    use crate::observability::MetricsRegistry;
    use crate::plan::{CompiledPlan, FieldSettings, SortDirection, TableSettings};
    use crate::store::{DataStoreSettings, MapDataStore};

    fn store() -> MapDataStore {
        let plan = CompiledPlan::compile(&TableSettings {
            fields: vec![
                FieldSettings::new("key", Expression::field(0))
                    .grouped(0)
                    .sorted(0, SortDirection::Asc),
                FieldSettings::new("count", Expression::count()),
                FieldSettings::new(
                    "last",
                    Expression::select(SelectorKind::Last, Expression::field(1)),
                ),
            ],
            show_detail: true,
            max_results: vec![],
        })
        .unwrap();
        let store = MapDataStore::new(
            "table",
            Arc::new(plan),
            DataStoreSettings::default(),
            Arc::new(MetricsRegistry::new()),
        );
        for (key, value) in [("A", 1), ("B", 2), ("A", 3), ("C", 4)] {
            store.add(&[Val::from(key), Val::Integer(value)]);
        }
        store
    }

    #[test]
    fn test_rows_and_totals() {
        let store = store();
        let creator = TableResultCreator::new(Sizes::unlimited());
        let result = creator.create(&store, &ResultRequest::new("t"));

        assert_eq!(result.fields, vec!["key", "count", "last"]);
        assert_eq!(result.total_results, 3);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0].values, vec![Some("A".into()), Some("2".into()), Some("3".into())]);
        assert_eq!(result.rows[0].depth, 0);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_open_group_expands_children() {
        let store = store();
        let creator = TableResultCreator::new(Sizes::unlimited());
        let first = creator.create(&store, &ResultRequest::new("t"));
        let a_key = first.rows[0].group_key.clone().unwrap();

        let result = creator.create(&store, &ResultRequest::new("t").open_group(a_key));
        assert_eq!(result.total_results, 5);
        assert_eq!(result.rows[1].depth, 1);
        assert!(result.rows[1].group_key.is_none());
        assert_eq!(result.rows[3].values[0], Some("B".into()));
    }

    #[test]
    fn test_window_and_max_results() {
        let store = store();
        let creator = TableResultCreator::new(Sizes::new(vec![2]));
        let result = creator.create(&store, &ResultRequest::new("t").range(1, 5));
        assert_eq!(result.total_results, 2);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].values[0], Some("B".into()));
        assert_eq!(result.result_range, OffsetRange::new(1, 1));
    }
}
