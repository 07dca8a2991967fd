//! Progress and status tracking exposed through the `getProgress` query.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::state::SagaState;

/// Point-in-time view of a saga's progress.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Percent complete, 0 to 100.
    pub percent: u8,
    /// Label of the step in progress, empty before the first step.
    pub status: String,
    pub state: SagaState,
}

/// Single-writer progress cell with lock-protected concurrent reads.
///
/// Cloning yields another handle to the same state, so query handlers can
/// read while the orchestrator is suspended.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records progress and the current status label.
    pub fn set_progress(&self, percent: u8, status: impl Into<String>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.percent = percent.min(100);
        inner.status = status.into();
    }

    /// Records progress without changing the status label.
    pub fn set_percent(&self, percent: u8) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.percent = percent.min(100);
    }

    /// Moves the saga to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&self, next: SagaState) -> Result<(), SagaError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.state.can_transition_to(next) {
            return Err(SagaError::InvalidState {
                from: inner.state,
                to: next,
            });
        }
        tracing::debug!(from = %inner.state, to = %next, "saga state transition");
        inner.state = next;
        Ok(())
    }

    /// Returns the percent complete.
    pub fn query(&self) -> u8 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .percent
    }

    pub fn state(&self) -> SagaState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
