//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of an order saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► FraudChecking ──► PreparingShipment ──► ChargingCustomer ──┬──► AwaitingAddress ──► Shipping ──► Completed
///                                                                        ├──► Shipping
///                                                                        └──► Compensating ──► Failed
/// ```
/// Any non-terminal state may also move straight to `Failed` (nothing to
/// compensate yet, or an unrecoverable defect), and `Shipping` may move to
/// `Compensating` when a shipment fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    Created,
    FraudChecking,
    PreparingShipment,
    ChargingCustomer,
    /// Blocked on the human-interaction gate.
    AwaitingAddress,
    Shipping,
    /// A step failed and undo actions are running.
    Compensating,
    /// All items shipped (terminal state).
    Completed,
    /// The saga terminated with an error (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if the saga may move from `self` to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        match (self, next) {
            (Created, FraudChecking)
            | (FraudChecking, PreparingShipment)
            | (PreparingShipment, ChargingCustomer)
            | (ChargingCustomer, AwaitingAddress)
            | (ChargingCustomer, Shipping)
            | (ChargingCustomer, Compensating)
            | (AwaitingAddress, Shipping)
            | (Shipping, Completed)
            | (Shipping, Compensating)
            | (Compensating, Failed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Created => "Created",
            SagaState::FraudChecking => "FraudChecking",
            SagaState::PreparingShipment => "PreparingShipment",
            SagaState::ChargingCustomer => "ChargingCustomer",
            SagaState::AwaitingAddress => "AwaitingAddress",
            SagaState::Shipping => "Shipping",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_created() {
        assert_eq!(SagaState::default(), SagaState::Created);
    }

    #[test]
    fn test_forward_path() {
        let path = [
            SagaState::Created,
            SagaState::FraudChecking,
            SagaState::PreparingShipment,
            SagaState::ChargingCustomer,
            SagaState::AwaitingAddress,
            SagaState::Shipping,
            SagaState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(SagaState::ChargingCustomer.can_transition_to(SagaState::Shipping));
    }

    #[test]
    fn test_compensation_path() {
        assert!(SagaState::ChargingCustomer.can_transition_to(SagaState::Compensating));
        assert!(SagaState::Shipping.can_transition_to(SagaState::Compensating));
        assert!(SagaState::Compensating.can_transition_to(SagaState::Failed));
        assert!(!SagaState::FraudChecking.can_transition_to(SagaState::Compensating));
        assert!(!SagaState::Compensating.can_transition_to(SagaState::Completed));
    }

    #[test]
    fn test_direct_failure_from_any_live_state() {
        assert!(SagaState::Created.can_transition_to(SagaState::Failed));
        assert!(SagaState::FraudChecking.can_transition_to(SagaState::Failed));
        assert!(SagaState::ChargingCustomer.can_transition_to(SagaState::Failed));
        assert!(!SagaState::Completed.can_transition_to(SagaState::Failed));
        assert!(!SagaState::Failed.can_transition_to(SagaState::Failed));
    }

    #[test]
    fn test_no_skipping_steps() {
        assert!(!SagaState::Created.can_transition_to(SagaState::Shipping));
        assert!(!SagaState::FraudChecking.can_transition_to(SagaState::ChargingCustomer));
        assert!(!SagaState::Completed.can_transition_to(SagaState::Created));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::Created.is_terminal());
        assert!(!SagaState::Shipping.is_terminal());
        assert!(!SagaState::Compensating.is_terminal());
        assert!(SagaState::Completed.is_terminal());
        assert!(SagaState::Failed.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::Created.to_string(), "Created");
        assert_eq!(SagaState::AwaitingAddress.to_string(), "AwaitingAddress");
        assert_eq!(SagaState::Compensating.to_string(), "Compensating");
        assert_eq!(SagaState::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_serialization() {
        let state = SagaState::Shipping;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
