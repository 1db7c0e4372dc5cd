//! Selector functions over the rows beneath a grouped item

use serde::{Deserialize, Serialize};

use super::val::Val;

/// Lazy, indexed view over sibling rows sharing one parent.
///
/// Values are resolved on demand by position.
pub trait Selection {
    fn size(&self) -> usize;
    fn get(&self, pos: usize) -> Val;
}

/// How many child rows a selector needs, and from which end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionHint {
    pub limit: usize,
    pub sort: bool,
    /// Keep the last `limit` rows after sorting instead of the first
    pub trim_top: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorKind {
    Any,
    First,
    Last,
    /// One-based position
    Nth { position: usize },
    Top { limit: usize, delimiter: String },
    Bottom { limit: usize, delimiter: String },
}

impl SelectorKind {
    pub fn hint(&self) -> SelectionHint {
        let (limit, sort, trim_top) = match self {
            SelectorKind::Any => (1, false, false),
            SelectorKind::First => (1, true, false),
            SelectorKind::Last => (1, true, true),
            SelectorKind::Nth { position } => (*position, true, false),
            SelectorKind::Top { limit, .. } => (*limit, true, false),
            SelectorKind::Bottom { limit, .. } => (*limit, true, true),
        };
        SelectionHint {
            limit,
            sort,
            trim_top,
        }
    }

    /// Resolve against a selection. The selection may be the full sorted
    /// child list or a view already trimmed according to `hint()`.
    pub fn select(&self, selection: &dyn Selection) -> Val {
        let size = selection.size();
        if size == 0 {
            return Val::Null;
        }

        match self {
            SelectorKind::Any | SelectorKind::First => selection.get(0),
            SelectorKind::Last => selection.get(size - 1),
            SelectorKind::Nth { position } => {
                if *position == 0 || *position > size {
                    Val::Null
                } else {
                    selection.get(position - 1)
                }
            }
            SelectorKind::Top { limit, delimiter } => {
                join(selection, 0..size.min(*limit), delimiter)
            }
            SelectorKind::Bottom { limit, delimiter } => {
                join(selection, size.saturating_sub(*limit)..size, delimiter)
            }
        }
    }
}

fn join(selection: &dyn Selection, range: std::ops::Range<usize>, delimiter: &str) -> Val {
    let parts: Vec<String> = range.map(|pos| selection.get(pos).to_string()).collect();
    Val::String(parts.join(delimiter))
}
