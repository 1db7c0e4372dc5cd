//! Compiled field expressions and their per-row generators
//!
//! An `Expression` is an already-compiled handle; nothing here parses text.
//! Each output field of each stored row owns one `Generator` built from its
//! expression:
//! - `set` binds one raw row
//! - `eval` resolves the current value
//! - `merge` combines two generators for the same grouped key
//! - `select` resolves selector functions over the rows beneath an item

mod generator;
mod selection;
mod val;

pub use generator::{merge_generators, read_generators, write_generators, Generator, State};
pub use selection::{Selection, SelectionHint, SelectorKind};
pub use val::Val;

use serde::{Deserialize, Serialize};

/// A compiled field expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    /// Value of the input column at `index`
    Field { index: usize },
    Constant { value: Val },
    Count,
    Sum { arg: Box<Expression> },
    Min { arg: Box<Expression> },
    Max { arg: Box<Expression> },
    Average { arg: Box<Expression> },
    /// Picks values from the rows beneath a grouped item
    Select {
        selector: SelectorKind,
        arg: Box<Expression>,
    },
}

impl Expression {
    pub fn field(index: usize) -> Self {
        Expression::Field { index }
    }

    pub fn constant(value: impl Into<Val>) -> Self {
        Expression::Constant {
            value: value.into(),
        }
    }

    pub fn count() -> Self {
        Expression::Count
    }

    pub fn sum(arg: Expression) -> Self {
        Expression::Sum { arg: Box::new(arg) }
    }

    pub fn min(arg: Expression) -> Self {
        Expression::Min { arg: Box::new(arg) }
    }

    pub fn max(arg: Expression) -> Self {
        Expression::Max { arg: Box::new(arg) }
    }

    pub fn average(arg: Expression) -> Self {
        Expression::Average { arg: Box::new(arg) }
    }

    pub fn select(selector: SelectorKind, arg: Expression) -> Self {
        Expression::Select {
            selector,
            arg: Box::new(arg),
        }
    }

    /// Evaluate against a single row, as if it were the only row in its group.
    ///
    /// Unknown column indexes evaluate to null rather than failing the row.
    pub fn evaluate(&self, row: &[Val]) -> Val {
        match self {
            Expression::Field { index } => row.get(*index).cloned().unwrap_or_default(),
            Expression::Constant { value } => value.clone(),
            Expression::Count => Val::Integer(1),
            Expression::Sum { arg } => {
                let v = arg.evaluate(row);
                if v.is_numeric() {
                    v
                } else {
                    Val::Null
                }
            }
            Expression::Average { arg } => match arg.evaluate(row).as_f64() {
                Some(x) => Val::Double(x),
                None => Val::Null,
            },
            Expression::Min { arg } | Expression::Max { arg } | Expression::Select { arg, .. } => {
                arg.evaluate(row)
            }
        }
    }

    /// True for expressions whose value depends on more than one row.
    pub fn has_aggregate(&self) -> bool {
        !matches!(self, Expression::Field { .. } | Expression::Constant { .. })
    }

    pub fn selector(&self) -> Option<&SelectorKind> {
        match self {
            Expression::Select { selector, .. } => Some(selector),
            _ => None,
        }
    }
}
