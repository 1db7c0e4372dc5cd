//! Compiled query plan
//!
//! Built once per table from `TableSettings` and shared read-only by every
//! store that ingests rows for that table:
//! - `CompiledField` per output column (expression, group depth, filter, sort)
//! - `CompiledDepths` describing which depths group and on which fields
//! - one optional `CompiledSorter` per depth
//!
//! # Usage
//!
//! ```ignore
//! let plan = CompiledPlan::compile(&settings)?;
//! let sorter = plan.sorter(0);
//! ```

mod depths;
mod errors;
mod fields;
mod filter;
mod settings;
mod sizes;
mod sorter;

pub use depths::CompiledDepths;
pub use errors::{PlanError, PlanResult};
pub use fields::CompiledField;
pub use filter::CompiledFilter;
pub use settings::{FieldSettings, FilterSettings, Format, SortDirection, SortSettings, TableSettings};
pub use sizes::Sizes;
pub use sorter::{CompiledSorter, SortKey};

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::expression::Expression;

#[derive(Debug, Clone)]
pub struct CompiledPlan {
    fields: Vec<CompiledField>,
    expressions: Vec<Option<Arc<Expression>>>,
    depths: CompiledDepths,
    sorters: Vec<Option<CompiledSorter>>,
    max_results: Sizes,
}

impl CompiledPlan {
    pub fn compile(settings: &TableSettings) -> PlanResult<Self> {
        if settings.fields.is_empty() {
            return Err(PlanError::NoFields);
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(settings.fields.len());
        for field in &settings.fields {
            let compiled = CompiledField::compile(field)?;
            if !seen.insert(compiled.id.clone()) {
                return Err(PlanError::DuplicateField(compiled.id));
            }
            fields.push(compiled);
        }

        let expressions = fields.iter().map(|f| f.expression.clone()).collect();
        let depths = CompiledDepths::new(&fields, settings.show_detail);
        let sorters = (0..=depths.max_depth())
            .map(|depth| CompiledSorter::for_depth(&fields, depth))
            .collect();

        Ok(Self {
            fields,
            expressions,
            depths,
            sorters,
            max_results: Sizes::new(settings.max_results.clone()),
        })
    }

    /// Reject plans whose field references fall outside a row of `width` columns.
    pub fn validate_width(&self, width: usize) -> PlanResult<()> {
        for field in &self.fields {
            if let Some(index) = field.expression.as_deref().and_then(highest_column) {
                if index >= width {
                    return Err(PlanError::ColumnOutOfRange {
                        field: field.name.clone(),
                        index,
                        width,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    pub fn expressions(&self) -> &[Option<Arc<Expression>>] {
        &self.expressions
    }

    pub fn depths(&self) -> &CompiledDepths {
        &self.depths
    }

    pub fn sorter(&self, depth: usize) -> Option<&CompiledSorter> {
        self.sorters.get(depth).and_then(Option::as_ref)
    }

    pub fn has_sort(&self) -> bool {
        self.sorters.iter().any(Option::is_some)
    }

    pub fn has_filter(&self) -> bool {
        self.fields.iter().any(|f| f.filter.is_some())
    }

    /// Client-visible limits requested in the table settings.
    pub fn max_results(&self) -> &Sizes {
        &self.max_results
    }

    /// Human-readable description of the compiled layout.
    pub fn explain(&self) -> Value {
        let depths: Vec<Value> = (0..=self.depths.max_depth())
            .map(|depth| {
                let group: Vec<&str> = self
                    .depths
                    .group_indices(depth)
                    .iter()
                    .map(|i| self.fields[*i].name.as_str())
                    .collect();
                let sort: Vec<Value> = self
                    .sorter(depth)
                    .map(|s| {
                        s.keys()
                            .iter()
                            .map(|k| json!({"field": self.fields[k.field_index].name, "direction": k.direction}))
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "depth": depth,
                    "grouped": self.depths.is_grouped(depth),
                    "group_fields": group,
                    "sort": sort,
                })
            })
            .collect();

        json!({
            "fields": self.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "max_depth": self.depths.max_depth(),
            "depths": depths,
        })
    }
}

fn highest_column(expression: &Expression) -> Option<usize> {
    match expression {
        Expression::Field { index } => Some(*index),
        Expression::Constant { .. } | Expression::Count => None,
        Expression::Sum { arg }
        | Expression::Min { arg }
        | Expression::Max { arg }
        | Expression::Average { arg }
        | Expression::Select { arg, .. } => highest_column(arg),
    }
}
