//! Human-in-the-loop gate for address corrections.
//!
//! Corrections arrive on the "UpdateOrder" signal (accepted unconditionally)
//! or the "UpdateOrder" update (validated first, answered with a
//! confirmation). The orchestrator waits on the gate for a bounded time and
//! locks it once shipping starts.

use std::sync::Arc;
use std::time::Duration;

use common::UpdateOrderInput;
use tokio::sync::watch;

use crate::error::SagaError;
use crate::order_fulfillment::UPDATE_ORDER;

#[derive(Debug, Default)]
struct GateState {
    pending: Option<String>,
    locked: bool,
}

/// Holds the pending address correction of one saga execution.
#[derive(Debug, Clone)]
pub struct AddressGate {
    tx: Arc<watch::Sender<GateState>>,
}

impl Default for AddressGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Rejects addresses that are blank or do not start with a digit.
    pub fn validate_address(address: &str) -> Result<(), SagaError> {
        match address.chars().next() {
            Some(c) if c.is_ascii_digit() => Ok(()),
            _ => {
                tracing::info!(address, "rejecting order update, invalid address");
                Err(SagaError::InvalidAddress(address.to_string()))
            }
        }
    }

    /// Handles the "UpdateOrder" signal: overwrites the pending address.
    ///
    /// Signals delivered after the gate is locked are dropped.
    pub fn signal(&self, input: UpdateOrderInput) {
        let accepted = self.tx.send_if_modified(|state| {
            if state.locked {
                return false;
            }
            state.pending = Some(input.address.clone());
            true
        });
        if accepted {
            tracing::info!(signal = UPDATE_ORDER, address = %input.address, "received signal");
        } else {
            tracing::info!(signal = UPDATE_ORDER, address = %input.address, "ignoring signal, address is locked");
        }
    }

    /// Handles the "UpdateOrder" update: validates, overwrites, confirms.
    pub fn update(&self, input: UpdateOrderInput) -> Result<String, SagaError> {
        Self::validate_address(&input.address)?;

        let mut locked = false;
        self.tx.send_if_modified(|state| {
            if state.locked {
                locked = true;
                return false;
            }
            state.pending = Some(input.address.clone());
            true
        });
        if locked {
            return Err(SagaError::AddressLocked);
        }

        tracing::info!(update = UPDATE_ORDER, address = %input.address, "updating order address");
        Ok(format!("Updated address: {}", input.address))
    }

    /// Waits up to `timeout` for a correction, then locks the gate.
    ///
    /// Returns `None` when no correction arrived; that is not an error. The
    /// returned address is read under the same write that locks the gate,
    /// so every confirmed update is the one the workflow uses.
    pub async fn wait(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.tx.subscribe();
        let _ = tokio::time::timeout(timeout, async {
            rx.wait_for(|state| state.pending.is_some()).await.map(|_| ())
        })
        .await;

        let mut received = None;
        self.tx.send_modify(|state| {
            state.locked = true;
            received = state.pending.clone();
        });
        received
    }

    /// Freezes the address: later signals are dropped and updates rejected.
    pub fn lock(&self) {
        self.tx.send_modify(|state| state.locked = true);
    }

    pub fn is_locked(&self) -> bool {
        self.tx.borrow().locked
    }

    /// Returns the pending correction, if any.
    pub fn pending(&self) -> Option<String> {
        self.tx.borrow().pending.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator() {
        assert!(AddressGate::validate_address("456 Oak Ave").is_ok());
        assert!(AddressGate::validate_address("9").is_ok());
        assert!(matches!(
            AddressGate::validate_address("Oak Ave"),
            Err(SagaError::InvalidAddress(_))
        ));
        assert!(AddressGate::validate_address("").is_err());
        assert!(AddressGate::validate_address(" 12 Oak Ave").is_err());
    }

    #[test]
    fn test_rejected_update_does_not_mutate() {
        let gate = AddressGate::new();
        gate.signal(UpdateOrderInput::new("1 First St"));

        let err = gate.update(UpdateOrderInput::new("Nowhere")).unwrap_err();

        assert!(matches!(err, SagaError::InvalidAddress(_)));
        assert_eq!(gate.pending().as_deref(), Some("1 First St"));
    }

    #[test]
    fn test_accepted_update_returns_confirmation() {
        let gate = AddressGate::new();
        let reply = gate.update(UpdateOrderInput::new("456 Oak Ave")).unwrap();
        assert_eq!(reply, "Updated address: 456 Oak Ave");
        assert_eq!(gate.pending().as_deref(), Some("456 Oak Ave"));
    }

    #[test]
    fn test_signal_is_unvalidated_and_last_write_wins() {
        let gate = AddressGate::new();
        gate.signal(UpdateOrderInput::new("first"));
        gate.signal(UpdateOrderInput::new("Second Street"));
        assert_eq!(gate.pending().as_deref(), Some("Second Street"));
    }

    #[test]
    fn test_locked_gate_rejects_changes() {
        let gate = AddressGate::new();
        gate.lock();

        gate.signal(UpdateOrderInput::new("1 First St"));
        assert_eq!(gate.pending(), None);
        assert!(matches!(
            gate.update(UpdateOrderInput::new("2 Second St")),
            Err(SagaError::AddressLocked)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_correction() {
        let gate = AddressGate::new();
        let started = tokio::time::Instant::now();

        let received = gate.wait(Duration::from_secs(60)).await;

        assert_eq!(received, None);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(gate.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_resolves_on_signal() {
        let gate = AddressGate::new();
        let sender = gate.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            sender.signal(UpdateOrderInput::new("789 Pine Rd"));
        });

        let started = tokio::time::Instant::now();
        let received = gate.wait(Duration::from_secs(60)).await;

        assert_eq!(received.as_deref(), Some("789 Pine Rd"));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_confirmed_update_is_the_address_used() {
        for round in 0..500 {
            let gate = AddressGate::new();
            let writer = gate.clone();
            let updates = tokio::task::spawn_blocking(move || {
                let mut confirmed = None;
                for n in 1..=50 {
                    let address = format!("{n} St");
                    match writer.update(UpdateOrderInput::new(address.clone())) {
                        Ok(_) => confirmed = Some(address),
                        Err(SagaError::AddressLocked) => break,
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
                confirmed
            });

            let used = gate.wait(Duration::from_millis(1)).await;
            let confirmed = updates.await.unwrap();
            assert_eq!(used, confirmed, "round {round}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_signal_resolves_immediately() {
        let gate = AddressGate::new();
        gate.signal(UpdateOrderInput::new("1 Early St"));

        let received = gate.wait(Duration::from_secs(60)).await;
        assert_eq!(received.as_deref(), Some("1 Early St"));
    }
}
