use thiserror::Error;

use crate::position::Coordinate;

/// Errors that abort the instrumentation of a file
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("Failed to load the C grammar: {0}")]
    Language(String),

    #[error("Parser gave up on the input")]
    ParseAborted,

    #[error("Node `{kind}` starts at {start}, before the traversal cursor {cursor}")]
    OutOfOrder {
        kind: String,
        start: Coordinate,
        cursor: Coordinate,
    },

    #[error("Patch at {at} lies outside the document ({lines} lines)")]
    PatchOutOfRange { at: Coordinate, lines: usize },

    #[error("Masked construct could not be restored; no match for `{pattern}`")]
    RestorationMiss { pattern: String },

    #[error("Invalid restoration pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to render trace record: {0}")]
    Record(#[from] serde_json::Error),
}

impl InstrumentError {
    /// Create an out-of-order traversal error
    pub fn out_of_order(kind: &str, start: Coordinate, cursor: Coordinate) -> Self {
        Self::OutOfOrder {
            kind: kind.to_string(),
            start,
            cursor,
        }
    }

    /// Internal-consistency violations, as opposed to input or environment problems
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::OutOfOrder { .. } | Self::PatchOutOfRange { .. })
    }
}

/// Result type for instrumentation operations
pub type Result<T> = std::result::Result<T, InstrumentError>;
