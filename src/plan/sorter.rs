//! Per-depth row ordering
//!
//! Sorts are stable so that rows comparing equal keep arrival order.

use std::cmp::Ordering;

use crate::expression::{Generator, Val};

use super::fields::CompiledField;
use super::settings::SortDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field_index: usize,
    pub direction: SortDirection,
}

/// Comparator over generator sets at one depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSorter {
    keys: Vec<SortKey>,
}

impl CompiledSorter {
    /// A field sorts rows at `depth` when it is ungrouped or grouped at or
    /// below that depth. Returns `None` when nothing sorts at this depth.
    pub fn for_depth(fields: &[CompiledField], depth: usize) -> Option<Self> {
        let mut keyed: Vec<(u32, usize, SortDirection)> = fields
            .iter()
            .enumerate()
            .filter_map(|(index, field)| {
                let sort = field.sort?;
                let applies = field.group_depth.map_or(true, |g| g >= depth);
                applies.then_some((sort.priority, index, sort.direction))
            })
            .collect();

        if keyed.is_empty() {
            return None;
        }

        keyed.sort_by_key(|(priority, index, _)| (*priority, *index));
        Some(Self {
            keys: keyed
                .into_iter()
                .map(|(_, field_index, direction)| SortKey {
                    field_index,
                    direction,
                })
                .collect(),
        })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn compare(&self, a: &[Option<Generator>], b: &[Option<Generator>]) -> Ordering {
        for key in &self.keys {
            let ordering = value_at(a, key.field_index).compare(&value_at(b, key.field_index));
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of `items` by the generator sets `generators` extracts.
    pub fn sort<T>(&self, items: &mut [T], generators: impl Fn(&T) -> &[Option<Generator>]) {
        items.sort_by(|a, b| self.compare(generators(a), generators(b)));
    }
}

fn value_at(generators: &[Option<Generator>], index: usize) -> Val {
    generators
        .get(index)
        .and_then(Option::as_ref)
        .map(Generator::eval)
        .unwrap_or_default()
}
