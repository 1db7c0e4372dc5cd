//! Plan compilation errors

use thiserror::Error;

/// Result type for plan compilation
pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Table has no fields")]
    NoFields,

    #[error("Invalid {kind} filter on field '{field}': {reason}")]
    InvalidFilter {
        field: String,
        kind: &'static str,
        reason: String,
    },

    #[error("Field '{field}' references column {index} but rows have {width} columns")]
    ColumnOutOfRange {
        field: String,
        index: usize,
        width: usize,
    },

    #[error("Duplicate field id: {0}")]
    DuplicateField(String),
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::NoFields => "SEARCHSTORE_PLAN_NO_FIELDS",
            PlanError::InvalidFilter { .. } => "SEARCHSTORE_PLAN_INVALID_FILTER",
            PlanError::ColumnOutOfRange { .. } => "SEARCHSTORE_PLAN_COLUMN_OUT_OF_RANGE",
            PlanError::DuplicateField(_) => "SEARCHSTORE_PLAN_DUPLICATE_FIELD",
        }
    }
}
