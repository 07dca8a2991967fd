//! Capability handle through which workflows reach the execution engine.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common::ShippingInput;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::activities::OrderActivities;
use crate::error::{ActivityError, SagaError};
use crate::gate::AddressGate;
use crate::progress::ProgressTracker;
use crate::retry::{ActivityInfo, ActivityOptions};
use crate::scenario::Scenario;

/// Identity of the running workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowInfo {
    pub workflow_id: String,
    pub workflow_type: String,
    pub scenario: Scenario,
    pub parent_workflow_id: Option<String>,
}

/// Pauses between saga steps that pace the demo's progress bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPacing {
    pub after_fraud_check: Duration,
    pub after_prepare_shipment: Duration,
    pub after_charge: Duration,
    pub after_shipping: Duration,
}

impl Default for StepPacing {
    fn default() -> Self {
        Self {
            after_fraud_check: Duration::from_secs(1),
            after_prepare_shipment: Duration::from_secs(1),
            after_charge: Duration::from_secs(3),
            after_shipping: Duration::from_secs(1),
        }
    }
}

impl StepPacing {
    /// No pauses between steps.
    pub fn none() -> Self {
        Self {
            after_fraud_check: Duration::ZERO,
            after_prepare_shipment: Duration::ZERO,
            after_charge: Duration::ZERO,
            after_shipping: Duration::ZERO,
        }
    }
}

/// Per-execution tunables handed to the workflow by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub pacing: StepPacing,
    /// How long the human-interaction gate waits for a correction.
    pub address_wait: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            pacing: StepPacing::default(),
            address_wait: Duration::from_secs(60),
        }
    }
}

/// What happens to a child workflow when its parent closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentClosePolicy {
    #[default]
    Terminate,
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildWorkflowOptions {
    pub workflow_id: String,
    pub parent_close_policy: ParentClosePolicy,
}

/// Terminal result of a child workflow as seen by its handles.
pub type ChildOutcome = Result<(), String>;

/// Handle to a started child workflow.
///
/// Under [`ParentClosePolicy::Terminate`] dropping the handle before the
/// child finishes terminates the child.
#[derive(Debug)]
pub struct ChildHandle {
    workflow_id: String,
    outcome: watch::Receiver<Option<ChildOutcome>>,
    abort: AbortHandle,
    policy: ParentClosePolicy,
}

impl ChildHandle {
    pub fn new(
        workflow_id: impl Into<String>,
        outcome: watch::Receiver<Option<ChildOutcome>>,
        abort: AbortHandle,
        policy: ParentClosePolicy,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            outcome,
            abort,
            policy,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Waits for the child to finish.
    pub async fn result(mut self) -> Result<(), SagaError> {
        let outcome = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => Some(Err("child workflow terminated".to_string())),
        };
        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(SagaError::ChildWorkflowFailed {
                workflow_id: self.workflow_id.clone(),
                reason,
            }),
            None => Err(SagaError::ChildWorkflowFailed {
                workflow_id: self.workflow_id.clone(),
                reason: "child workflow produced no result".to_string(),
            }),
        }
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        let finished = self.outcome.borrow().is_some();
        if self.policy == ParentClosePolicy::Terminate && !finished && !self.abort.is_finished() {
            tracing::info!(workflow_id = %self.workflow_id, "terminating child workflow with parent");
            self.abort.abort();
        }
    }
}

/// Engine capabilities available to a running workflow.
///
/// Every suspension point of a workflow goes through this trait: activity
/// calls, timers, children and the shipping service.
#[async_trait]
pub trait WorkflowContext: Send + Sync {
    type Activities: OrderActivities;

    fn info(&self) -> &WorkflowInfo;

    fn settings(&self) -> &WorkflowSettings;

    /// The activity implementation, used only inside `execute_activity` calls.
    fn activities(&self) -> &Self::Activities;

    fn progress(&self) -> &ProgressTracker;

    fn gate(&self) -> &AddressGate;

    /// Invokes an activity under `options`, retrying per its policy.
    async fn execute_activity<T, F, Fut>(
        &self,
        activity: &str,
        options: &ActivityOptions,
        call: F,
    ) -> Result<T, SagaError>
    where
        T: Send,
        F: Fn(ActivityInfo) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ActivityError>> + Send;

    /// Durable timer.
    async fn sleep(&self, duration: Duration);

    /// Starts the shipping workflow for one item as a child of this workflow.
    fn start_shipping_child(
        &self,
        options: ChildWorkflowOptions,
        input: ShippingInput,
    ) -> Result<ChildHandle, SagaError>;

    /// Ships one item through the shipping service endpoint.
    async fn execute_shipping_operation(&self, input: ShippingInput) -> Result<(), SagaError>;

    /// Publishes a keyword search attribute for this execution.
    fn upsert_search_attribute(&self, key: &str, value: &str);
}
