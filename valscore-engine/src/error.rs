//! Engine error type.

use thiserror::Error;
use valscore_common::ValidationError;

/// Errors that stop a batch before any record is scored.
///
/// Per-record problems never surface here; they become exclusions.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ValidationError),
}

impl EngineError {
    /// Operator error: the configuration must be fixed before retrying.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
