//! Error kinds surfaced to the analysis driver.
//!
//! No local recovery happens inside the fixpoint passes: every failure
//! bubbles up as one of these kinds. `ResourceExhausted` is special in that
//! the driver downgrades the verdict to "unknown" rather than "safe".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The regex compiler rejected a pattern.
    #[error("malformed regex {pattern:?}: {reason}")]
    MalformedRegex { pattern: String, reason: String },

    /// A dependency-graph node carries an operation the evaluator cannot model.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The dependency graph violates a structural invariant.
    #[error("inconsistent dependency graph: {0}")]
    GraphInconsistent(String),

    /// The cancellation token was triggered; partial results are discarded.
    #[error("analysis cancelled")]
    Cancelled,

    /// An intermediate automaton outgrew the configured state limit.
    #[error("automaton with {states} states exceeds the limit of {limit}")]
    ResourceExhausted { states: usize, limit: usize },
}

impl AnalysisError {
    pub fn malformed_regex(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::MalformedRegex {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
