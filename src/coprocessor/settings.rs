use serde::{Deserialize, Serialize};

use crate::plan::TableSettings;

use super::events::EventSettings;

/// Everything needed to build the stores for one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub query_key: String,
    pub components: Vec<ComponentSettings>,
    #[serde(default)]
    pub events: Vec<EventSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSettings {
    pub component_id: String,

    /// Components naming the same pipeline share one extraction pass
    #[serde(default)]
    pub extraction_pipeline: Option<String>,

    pub table: TableSettings,
}

impl ComponentSettings {
    pub fn new(component_id: impl Into<String>, table: TableSettings) -> Self {
        Self {
            component_id: component_id.into(),
            extraction_pipeline: None,
            table,
        }
    }

    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.extraction_pipeline = Some(pipeline.into());
        self
    }
}
