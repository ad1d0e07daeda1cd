//! Engine error taxonomy

use thiserror::Error;

/// Errors produced while synthesizing a schedule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    /// Malformed or out-of-range trip parameters. Never retried.
    #[error("invalid trip input: {0}")]
    InvalidInput(String),

    /// The HOS rules admit no legal schedule for the given balance.
    #[error("no legal schedule: the {limit} blocks further progress ({detail})")]
    Unschedulable { limit: String, detail: String },

    /// The engine produced an inconsistent stream. This is a bug and the
    /// computation is aborted rather than patched.
    #[error("schedule invariant violated: {0}")]
    InvariantViolation(String),
}

impl ScheduleError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ScheduleError::InvalidInput(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        ScheduleError::InvariantViolation(message.into())
    }

    /// Machine-readable code used in error envelopes
    pub const fn code(&self) -> &'static str {
        match self {
            ScheduleError::InvalidInput(_) => "INVALID_INPUT",
            ScheduleError::Unschedulable { .. } => "UNSCHEDULABLE",
            ScheduleError::InvariantViolation(_) => "INTERNAL_ERROR",
        }
    }
}
