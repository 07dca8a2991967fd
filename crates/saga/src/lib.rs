//! Saga orchestration for order fulfillment.
//!
//! An order saga runs these steps against remote activities:
//! 1. Check fraud
//! 2. Prepare shipment
//! 3. Charge customer
//! 4. Ship every item concurrently
//!
//! Completed compensable steps are undone in reverse order when a later step
//! fails. The workflow type's suffix selects a demo scenario (injected
//! faults, human-in-the-loop address correction, child workflow shipping).

pub mod activities;
pub mod compensation;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod order_fulfillment;
pub mod progress;
pub mod retry;
pub mod runtime;
pub mod scenario;
pub mod shipping;
pub mod state;

pub use activities::{OrderActivities, SimulatedActivities, SimulatedLatency};
pub use compensation::{Compensation, CompensationLedger};
pub use context::{
    ChildHandle, ChildWorkflowOptions, ParentClosePolicy, StepPacing, WorkflowContext,
    WorkflowInfo, WorkflowSettings,
};
pub use coordinator::{SagaCoordinator, run_static_workflow};
pub use error::{ActivityError, Result, SagaError};
pub use gate::AddressGate;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use retry::{ActivityInfo, ActivityOptions, RetryPolicy};
pub use runtime::{
    DEFAULT_CLOSED_RETENTION, ExecutionContext, ExecutionStatus, LocalRuntime, RuntimeConfig,
    WorkflowDescription, WorkflowHandle, WorkflowOutcome,
};
pub use scenario::{ALL_SCENARIOS, Scenario};
pub use shipping::ShippingWorkflow;
pub use state::SagaState;
