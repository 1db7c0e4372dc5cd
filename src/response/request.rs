use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Window length used when a request gives no range.
pub const DEFAULT_LENGTH: usize = i32::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub key: String,

    /// Incremental requests take whatever is available now
    #[serde(default)]
    pub incremental: bool,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub result_requests: Vec<ResultRequest>,
}

impl SearchRequest {
    pub fn new(key: impl Into<String>, result_requests: Vec<ResultRequest>) -> Self {
        Self {
            key: key.into(),
            incremental: false,
            timeout_ms: None,
            result_requests,
        }
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// What to deliver for one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fetch {
    None,
    #[default]
    All,
    /// Only when different from the last delivered result
    Changes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_length")]
    pub length: usize,
}

fn default_length() -> usize {
    DEFAULT_LENGTH
}

impl OffsetRange {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }
}

impl Default for OffsetRange {
    fn default() -> Self {
        Self::new(0, DEFAULT_LENGTH)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRequest {
    pub component_id: String,

    #[serde(default)]
    pub fetch: Fetch,

    #[serde(default)]
    pub range: Option<OffsetRange>,

    /// Encoded group keys whose children are expanded
    #[serde(default)]
    pub open_groups: Vec<String>,

    /// Overrides the table's own limits
    #[serde(default)]
    pub max_results: Option<Vec<usize>>,
}

impl ResultRequest {
    pub fn new(component_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            fetch: Fetch::All,
            range: None,
            open_groups: Vec::new(),
            max_results: None,
        }
    }

    pub fn fetch(mut self, fetch: Fetch) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn range(mut self, offset: usize, length: usize) -> Self {
        self.range = Some(OffsetRange::new(offset, length));
        self
    }

    pub fn open_group(mut self, group_key: impl Into<String>) -> Self {
        self.open_groups.push(group_key.into());
        self
    }

    pub fn max_results(mut self, sizes: Vec<usize>) -> Self {
        self.max_results = Some(sizes);
        self
    }
}
