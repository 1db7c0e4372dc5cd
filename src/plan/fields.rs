use std::sync::Arc;

use crate::expression::Expression;

use super::errors::PlanResult;
use super::filter::CompiledFilter;
use super::settings::{FieldSettings, Format, SortSettings};

/// One output column, ready for ingestion.
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub id: String,
    pub name: String,
    pub expression: Option<Arc<Expression>>,
    pub group_depth: Option<usize>,
    pub sort: Option<SortSettings>,
    pub filter: Option<CompiledFilter>,
    pub format: Format,
}

impl CompiledField {
    pub fn compile(settings: &FieldSettings) -> PlanResult<Self> {
        let filter = match &settings.filter {
            Some(filter) => CompiledFilter::compile(&settings.name, filter)?,
            None => None,
        };
        Ok(Self {
            id: settings.id.clone().unwrap_or_else(|| settings.name.clone()),
            name: settings.name.clone(),
            expression: settings.expression.clone().map(Arc::new),
            group_depth: settings.group,
            sort: settings.sort,
            filter,
            format: settings.format.clone(),
        })
    }

    pub fn has_aggregate(&self) -> bool {
        self.expression.as_ref().is_some_and(|e| e.has_aggregate())
    }
}
