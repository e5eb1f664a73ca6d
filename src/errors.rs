//! Typed error hierarchy for the review orchestrator.
//!
//! `ReviewError` carries the workflow taxonomy; everything else travels as
//! `anyhow::Error` and maps to exit code 1 at the top-level handler.

use thiserror::Error;

/// Exit code for generic failures and FAIL verdicts.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for INCOMPLETE / INVALID outcomes.
pub const EXIT_BLOCKED: u8 = 2;
/// Exit code for a run interrupted by the user.
pub const EXIT_ABORTED: u8 = 130;

/// Errors raised by workflow steps.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// A required predecessor artifact or state is missing.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Confirmed staleness between planning and execution.
    #[error("Drift detected since planning: {}. Re-run 'tribunal explore'/'tribunal plan' or pass --override-drift", reasons.join(", "))]
    Drift { reasons: Vec<String> },

    /// A submitted report broke the report contract.
    #[error("Report from '{participant}' violates the contract: {}", errors.join("; "))]
    ContractViolation {
        participant: String,
        errors: Vec<String>,
    },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state that does not match any known schema.
    #[error("Corrupt artifact {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Aborted by user")]
    Aborted,
}

impl ReviewError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error when it reaches the command handler.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Aborted => EXIT_ABORTED,
            _ => EXIT_FAILURE,
        }
    }
}

/// Map any error escaping a command to its exit code.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ReviewError>()
        .map(ReviewError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}
