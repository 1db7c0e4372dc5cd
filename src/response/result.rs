use serde::{Deserialize, Serialize};

use super::request::OffsetRange;

/// One formatted result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Encoded key of a grouped row; detail rows have none
    pub group_key: Option<String>,
    pub values: Vec<Option<String>>,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableResult {
    pub component_id: String,
    pub fields: Vec<String>,
    pub rows: Vec<Row>,
    /// Offset requested and number of rows returned
    pub result_range: OffsetRange,
    pub total_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableResult {
    pub fn error(component_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            fields: Vec::new(),
            rows: Vec::new(),
            result_range: OffsetRange::new(0, 0),
            total_results: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub highlights: Vec<String>,
    pub results: Option<Vec<TableResult>>,
    pub errors: Option<Vec<String>>,
    pub complete: bool,
}

impl SearchResponse {
    pub fn error_response(errors: Vec<String>) -> Self {
        Self {
            highlights: Vec::new(),
            results: None,
            errors: Some(errors),
            complete: false,
        }
    }

    pub fn results(&self) -> &[TableResult] {
        self.results.as_deref().unwrap_or_default()
    }

    pub fn result(&self, component_id: &str) -> Option<&TableResult> {
        self.results().iter().find(|r| r.component_id == component_id)
    }
}
