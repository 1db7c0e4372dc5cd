//! Table settings as supplied with a search request
//!
//! These are plain serde documents; `CompiledPlan::compile` turns them into
//! the immutable structures the stores run against.

use serde::{Deserialize, Serialize};

use crate::expression::Expression;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    pub fields: Vec<FieldSettings>,

    /// Keep individual rows beneath the deepest group
    #[serde(default = "default_show_detail")]
    pub show_detail: bool,

    /// Client-visible per-depth result limits
    #[serde(default)]
    pub max_results: Vec<usize>,
}

fn default_show_detail() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSettings {
    /// Defaults to the field name
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub expression: Option<Expression>,
    #[serde(default)]
    pub sort: Option<SortSettings>,
    #[serde(default)]
    pub filter: Option<FilterSettings>,
    /// Depth at which this field takes part in the group key
    #[serde(default)]
    pub group: Option<usize>,
    #[serde(default)]
    pub format: Format,
}

impl FieldSettings {
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            id: None,
            name: name.into(),
            expression: Some(expression),
            sort: None,
            filter: None,
            group: None,
            format: Format::General,
        }
    }

    pub fn grouped(mut self, depth: usize) -> Self {
        self.group = Some(depth);
        self
    }

    pub fn sorted(mut self, priority: u32, direction: SortDirection) -> Self {
        self.sort = Some(SortSettings {
            priority,
            direction,
        });
        self
    }

    pub fn filtered(mut self, include: Option<&str>, exclude: Option<&str>) -> Self {
        self.filter = Some(FilterSettings {
            include: include.map(str::to_string),
            exclude: exclude.map(str::to_string),
        });
        self
    }

    pub fn formatted(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSettings {
    /// Lower sorts first
    #[serde(default)]
    pub priority: u32,
    pub direction: SortDirection,
}

/// Regex include/exclude applied to a field's value on ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
}

/// How a value is rendered into a result row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Format {
    #[default]
    General,
    Number {
        decimal_places: usize,
        #[serde(default)]
        use_separator: bool,
    },
    /// strftime pattern, rendered in UTC
    Date { pattern: String },
    Text,
}
