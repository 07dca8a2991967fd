//! Saga error types.

use thiserror::Error;

use crate::state::SagaState;

/// Failure reported by a single activity attempt.
///
/// The variant decides whether the runtime re-invokes the activity under
/// its retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// Transient failure, retried with backoff.
    #[error("{0}")]
    Retryable(String),

    /// Business-rule failure, surfaced without retry.
    #[error("{0}")]
    NonRetryable(String),
}

impl ActivityError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        ActivityError::Retryable(reason.into())
    }

    pub fn non_retryable(reason: impl Into<String>) -> Self {
        ActivityError::NonRetryable(reason.into())
    }

    /// Returns true if the retry policy may re-invoke the activity.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Retryable(_))
    }
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// An activity failed terminally, either non-retryable or after the retry policy gave up.
    #[error("Activity '{activity}' failed after {attempts} attempt(s): {reason}")]
    ActivityFailed {
        activity: String,
        attempts: u32,
        reason: String,
        retryable: bool,
    },

    /// An address correction was rejected by the update validator.
    #[error("invalid-address: {0}")]
    InvalidAddress(String),

    /// The address can no longer be changed because shipping has started.
    #[error("Address is locked, order is already shipping")]
    AddressLocked,

    /// Injected unconditional failure modelling a software bug.
    #[error("Fatal defect: {0}")]
    FatalDefect(String),

    /// A compensation step failed.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// A child workflow failed or was terminated.
    #[error("Child workflow '{workflow_id}' failed: {reason}")]
    ChildWorkflowFailed { workflow_id: String, reason: String },

    /// Saga is in an invalid state for the requested transition.
    #[error("Invalid saga transition: {from} -> {to}")]
    InvalidState { from: SagaState, to: SagaState },

    /// A workflow with this ID is already running.
    #[error("Workflow already started: {0}")]
    AlreadyStarted(String),

    /// No workflow with this ID is known.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The workflow does not answer this query.
    #[error("Unknown query: {0}")]
    UnknownQuery(String),
}

impl SagaError {
    /// Builds the terminal error for an activity that stopped being retried.
    pub fn activity_failed(activity: &str, attempts: u32, err: ActivityError) -> Self {
        SagaError::ActivityFailed {
            activity: activity.to_string(),
            attempts,
            retryable: err.is_retryable(),
            reason: err.to_string(),
        }
    }

    /// Returns true if this failure happened inside a non-retryable activity.
    pub fn is_non_retryable_activity(&self) -> bool {
        matches!(
            self,
            SagaError::ActivityFailed {
                retryable: false,
                ..
            }
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_error_retryability() {
        assert!(ActivityError::retryable("timeout").is_retryable());
        assert!(!ActivityError::non_retryable("card invalid").is_retryable());
    }

    #[test]
    fn test_activity_failed_keeps_retryability() {
        let err = SagaError::activity_failed(
            "ChargeCustomer",
            1,
            ActivityError::non_retryable("credit card invalid"),
        );
        assert!(err.is_non_retryable_activity());
        assert_eq!(
            err.to_string(),
            "Activity 'ChargeCustomer' failed after 1 attempt(s): credit card invalid"
        );
    }

    #[test]
    fn test_invalid_address_message() {
        let err = SagaError::InvalidAddress("Main St".to_string());
        assert_eq!(err.to_string(), "invalid-address: Main St");
    }
}
