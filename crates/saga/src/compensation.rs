//! Compensation ledger: undo actions recorded on the forward path.

use common::OrderInput;

use crate::activities::OrderActivities;
use crate::context::WorkflowContext;
use crate::error::SagaError;
use crate::order_fulfillment::{ACTIVITY_UNDO_CHARGE_CUSTOMER, ACTIVITY_UNDO_PREPARE_SHIPMENT};
use crate::retry::ActivityOptions;

/// An undo action for a completed forward step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    UndoPrepareShipment(OrderInput),
    UndoChargeCustomer(OrderInput),
}

impl Compensation {
    /// Returns the activity name of the undo action.
    pub fn activity(&self) -> &'static str {
        match self {
            Compensation::UndoPrepareShipment(_) => ACTIVITY_UNDO_PREPARE_SHIPMENT,
            Compensation::UndoChargeCustomer(_) => ACTIVITY_UNDO_CHARGE_CUSTOMER,
        }
    }

    async fn run<C: WorkflowContext>(&self, ctx: &C) -> Result<(), SagaError> {
        let activities = ctx.activities();
        let options = ActivityOptions::compensation();
        match self {
            Compensation::UndoPrepareShipment(input) => {
                ctx.execute_activity(self.activity(), &options, move |info| {
                    activities.undo_prepare_shipment(info, input)
                })
                .await?;
            }
            Compensation::UndoChargeCustomer(input) => {
                ctx.execute_activity(self.activity(), &options, move |info| {
                    activities.undo_charge_customer(info, input)
                })
                .await?;
            }
        }
        Ok(())
    }
}

/// Insertion-ordered undo actions, unwound last-in first-out.
#[derive(Debug, Clone, Default)]
pub struct CompensationLedger {
    entries: Vec<Compensation>,
}

impl CompensationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an undo action after its forward step succeeded.
    pub fn append(&mut self, compensation: Compensation) {
        self.entries.push(compensation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Compensation] {
        &self.entries
    }

    /// Runs every undo action in reverse order, one at a time.
    ///
    /// Stops at the first undo that fails and returns
    /// [`SagaError::CompensationFailed`]; the ledger is consumed either way.
    #[tracing::instrument(skip_all, fields(workflow_id = %ctx.info().workflow_id, steps = self.entries.len()))]
    pub async fn unwind_all<C: WorkflowContext>(self, ctx: &C) -> Result<(), SagaError> {
        tracing::info!("saga compensations started");
        for compensation in self.entries.iter().rev() {
            let step = compensation.activity();
            if let Err(err) = compensation.run(ctx).await {
                tracing::error!(step, error = %err, "compensation step failed");
                return Err(SagaError::CompensationFailed {
                    step: step.to_string(),
                    reason: err.to_string(),
                });
            }
            metrics::counter!("saga_compensations_total", "step" => step).increment(1);
            tracing::info!(step, "compensation step completed");
        }
        Ok(())
    }
}
