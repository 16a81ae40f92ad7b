//! Measurement error taxonomy.
//!
//! Every variant is caught where it happens and degrades a single figure of a
//! record. None of them abort a scenario or the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeasureError {
    /// The external tool could not be launched or exited non-zero.
    #[error("{tool} failed (exit code {code:?}): {detail}")]
    ToolFailure {
        tool: String,
        code: Option<i32>,
        detail: String,
    },

    /// The external tool exceeded its wall-clock budget and was killed.
    #[error("{tool} timed out after {after_secs}s")]
    Timeout { tool: String, after_secs: u64 },

    /// Output did not match the expected structured or textual format.
    #[error("could not decode {tool} output: {reason}")]
    DecodeFailure { tool: String, reason: String },

    /// A host counter could not be read or parsed.
    #[error("host counter {counter} unavailable: {reason}")]
    MetricUnavailable { counter: String, reason: String },
}

impl MeasureError {
    /// Short machine-friendly label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            MeasureError::ToolFailure { .. } => "tool_failure",
            MeasureError::Timeout { .. } => "timeout",
            MeasureError::DecodeFailure { .. } => "decode_failure",
            MeasureError::MetricUnavailable { .. } => "metric_unavailable",
        }
    }
}
