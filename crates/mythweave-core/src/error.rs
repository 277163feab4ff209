//! Engine error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::participant::ParticipantId;
use crate::phase::PhaseType;

/// Top-level error type for the turn engine.
///
/// Only `Validation` prevents a `TurnResult` from being produced at all;
/// every other variant is folded into a result with `success = false` once
/// phases have begun.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// One or more preconditions failed before any phase ran. Carries every
    /// violation found, not just the first.
    #[error("turn validation failed: {}", violations.join("; "))]
    Validation {
        /// All precondition violations, in the order they were checked.
        violations: Vec<String>,
    },

    /// A phase's internal logic failed.
    #[error("phase {phase} failed: {reason}")]
    PhaseExecution {
        /// The phase that failed.
        phase: PhaseType,
        /// Human-readable failure description.
        reason: String,
    },

    /// A single participant decision call failed. Recovered locally by
    /// falling back to a default decision; never escalated on its own.
    #[error("gateway error for participant {participant}: {reason}")]
    Gateway {
        /// The participant whose decision call failed.
        participant: ParticipantId,
        /// Human-readable failure description.
        reason: String,
    },

    /// The AI spend cap was reached.
    #[error("ai budget exceeded: spent {spent:.4}, cap {cap:.4}")]
    BudgetExceeded {
        /// Total spend recorded when the cap was hit.
        spent: f64,
        /// The configured cap.
        cap: f64,
    },

    /// A global or per-call deadline elapsed.
    #[error("deadline exceeded in {scope} after {elapsed_ms}ms")]
    Timeout {
        /// What was being waited on ("turn", "phase world_update", ...).
        scope: String,
        /// Milliseconds elapsed when the deadline fired.
        elapsed_ms: u64,
    },

    /// A reversal routine itself failed during compensation. Fatal and
    /// non-retryable; must never be silently dropped.
    #[error("compensation gap: could not reverse phase {phase}: {reason}")]
    CompensationGap {
        /// The phase whose compensation could not complete.
        phase: PhaseType,
        /// Human-readable failure description.
        reason: String,
    },
}

impl EngineError {
    /// Stable machine-readable kind string for logs and error details.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation_error",
            EngineError::PhaseExecution { .. } => "phase_execution_error",
            EngineError::Gateway { .. } => "gateway_error",
            EngineError::BudgetExceeded { .. } => "budget_exceeded_error",
            EngineError::Timeout { .. } => "timeout_error",
            EngineError::CompensationGap { .. } => "compensation_gap_error",
        }
    }
}

/// Serializable snapshot of an error, carried on outcomes and results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error kind (see [`EngineError::kind`]).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&EngineError> for ErrorDetail {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}
