use regex::Regex;

use super::errors::{PlanError, PlanResult};
use super::settings::FilterSettings;

/// Include/exclude patterns for one field. Patterns must match the whole value.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl CompiledFilter {
    /// Returns `None` when neither pattern is set.
    pub fn compile(field: &str, settings: &FilterSettings) -> PlanResult<Option<Self>> {
        let include = compile_pattern(field, "include", settings.include.as_deref())?;
        let exclude = compile_pattern(field, "exclude", settings.exclude.as_deref())?;
        if include.is_none() && exclude.is_none() {
            return Ok(None);
        }
        Ok(Some(Self { include, exclude }))
    }

    pub fn matches(&self, value: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(value) {
                return false;
            }
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(value),
            None => true,
        }
    }
}

fn compile_pattern(field: &str, kind: &'static str, pattern: Option<&str>) -> PlanResult<Option<Regex>> {
    let pattern = match pattern.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(p) => p,
    };
    Regex::new(&format!("^(?:{})$", pattern))
        .map(Some)
        .map_err(|e| PlanError::InvalidFilter {
            field: field.to_string(),
            kind,
            reason: e.to_string(),
        })
}
