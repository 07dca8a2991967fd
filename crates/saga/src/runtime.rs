//! In-process workflow engine.
//!
//! Each workflow execution is one tokio task. Progress, search attributes
//! and the outcome live in shared cells so handles can read them while the
//! workflow is suspended.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderInput, OrderOutput, ShippingInput, UpdateOrderInput};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::activities::{OrderActivities, SimulatedActivities, SimulatedLatency};
use crate::context::{
    ChildHandle, ChildOutcome, ChildWorkflowOptions, ParentClosePolicy, StepPacing,
    WorkflowContext, WorkflowInfo, WorkflowSettings,
};
use crate::coordinator::{SagaCoordinator, run_static_workflow};
use crate::error::{ActivityError, SagaError};
use crate::gate::AddressGate;
use crate::order_fulfillment::{
    QUERY_PROGRESS, SHIPPING_WORKFLOW_TYPE, WORKFLOW_TYPE, shipment_workflow_id,
};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::retry::{ActivityInfo, ActivityOptions, execute_with_retry};
use crate::scenario::Scenario;
use crate::shipping::ShippingWorkflow;
use crate::state::SagaState;

/// Closed executions a runtime keeps for describe and result lookups.
pub const DEFAULT_CLOSED_RETENTION: usize = 1000;

/// Tunables for a runtime backed by [`SimulatedActivities`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub pacing: StepPacing,
    pub address_wait: Duration,
    pub latency: SimulatedLatency,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let settings = WorkflowSettings::default();
        Self {
            pacing: settings.pacing,
            address_wait: settings.address_wait,
            latency: SimulatedLatency::default(),
        }
    }
}

impl RuntimeConfig {
    /// No step pauses and no simulated latency; the address wait is unchanged.
    pub fn instant() -> Self {
        Self {
            pacing: StepPacing::none(),
            latency: SimulatedLatency::instant(),
            ..Self::default()
        }
    }

    pub fn settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            pacing: self.pacing.clone(),
            address_wait: self.address_wait,
        }
    }
}

/// Terminal result of a workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Completed(OrderOutput),
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Describes one workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDescription {
    pub workflow_id: String,
    pub workflow_type: String,
    pub status: ExecutionStatus,
    pub state: SagaState,
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}

type SearchAttributes = Arc<RwLock<BTreeMap<String, String>>>;

#[derive(Debug, Clone)]
struct Execution {
    info: WorkflowInfo,
    progress: ProgressTracker,
    gate: AddressGate,
    search_attributes: SearchAttributes,
    outcome: watch::Receiver<Option<WorkflowOutcome>>,
    start_time: DateTime<Utc>,
    close_time: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl Execution {
    fn is_running(&self) -> bool {
        self.outcome.borrow().is_none() && self.outcome.has_changed().is_ok()
    }

    fn closed_at(&self) -> DateTime<Utc> {
        let close_time = *self.close_time.read().unwrap_or_else(PoisonError::into_inner);
        close_time.unwrap_or(self.start_time)
    }
}

/// Drops the oldest closed executions until at most `retain` remain.
fn evict_closed(executions: &mut HashMap<String, Execution>, retain: usize) {
    let mut closed: Vec<(DateTime<Utc>, String)> = executions
        .iter()
        .filter(|(_, execution)| !execution.is_running())
        .map(|(id, execution)| (execution.closed_at(), id.clone()))
        .collect();
    if closed.len() <= retain {
        return;
    }

    closed.sort();
    let excess = closed.len() - retain;
    for (_, workflow_id) in closed.into_iter().take(excess) {
        tracing::debug!(%workflow_id, "evicting closed execution");
        executions.remove(&workflow_id);
    }
}

#[derive(Debug)]
struct ChildEntry {
    outcome: watch::Receiver<Option<ChildOutcome>>,
    abort: AbortHandle,
}

impl ChildEntry {
    fn is_running(&self) -> bool {
        self.outcome.borrow().is_none() && !self.abort.is_finished()
    }
}

struct RuntimeInner<A> {
    activities: Arc<A>,
    settings: WorkflowSettings,
    executions: RwLock<HashMap<String, Execution>>,
    closed_retention: usize,
    children: Mutex<HashMap<String, ChildEntry>>,
}

/// Runs order workflows on the current tokio runtime.
pub struct LocalRuntime<A: OrderActivities> {
    inner: Arc<RuntimeInner<A>>,
}

impl<A: OrderActivities> Clone for LocalRuntime<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl LocalRuntime<SimulatedActivities> {
    /// Creates a runtime over simulated activities.
    pub fn simulated(config: RuntimeConfig) -> Self {
        let settings = config.settings();
        Self::new(SimulatedActivities::with_latency(config.latency), settings)
    }
}

impl<A: OrderActivities> LocalRuntime<A> {
    pub fn new(activities: A, settings: WorkflowSettings) -> Self {
        Self::with_closed_retention(activities, settings, DEFAULT_CLOSED_RETENTION)
    }

    /// Creates a runtime that keeps at most `closed_retention` closed executions.
    ///
    /// Older closed executions are forgotten when new ones start; running
    /// executions are never evicted.
    pub fn with_closed_retention(
        activities: A,
        settings: WorkflowSettings,
        closed_retention: usize,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                activities: Arc::new(activities),
                settings,
                executions: RwLock::new(HashMap::new()),
                closed_retention,
                children: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn activities(&self) -> &A {
        &self.inner.activities
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.inner.settings
    }

    /// Starts a workflow execution.
    ///
    /// The bare `OrderWorkflow` type runs the static workflow; any other type
    /// runs the scenario workflow selected by its suffix. Fails with
    /// [`SagaError::AlreadyStarted`] while an execution with the same ID runs.
    #[tracing::instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub fn start_workflow(
        &self,
        workflow_type: &str,
        workflow_id: &str,
        input: OrderInput,
    ) -> Result<WorkflowHandle, SagaError> {
        let mut executions = self
            .inner
            .executions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if executions.get(workflow_id).is_some_and(Execution::is_running) {
            return Err(SagaError::AlreadyStarted(workflow_id.to_string()));
        }

        let info = WorkflowInfo {
            workflow_id: workflow_id.to_string(),
            workflow_type: workflow_type.to_string(),
            scenario: Scenario::from_workflow_type(workflow_type),
            parent_workflow_id: None,
        };
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let execution = Execution {
            info: info.clone(),
            progress: ProgressTracker::new(),
            gate: AddressGate::new(),
            search_attributes: SearchAttributes::default(),
            outcome: outcome_rx,
            start_time: Utc::now(),
            close_time: Arc::default(),
        };
        let ctx = ExecutionContext {
            runtime: self.clone(),
            info,
            progress: execution.progress.clone(),
            gate: execution.gate.clone(),
            search_attributes: Arc::clone(&execution.search_attributes),
        };
        let close_time = Arc::clone(&execution.close_time);
        let is_static = workflow_type == WORKFLOW_TYPE;

        tokio::spawn(async move {
            let result = if is_static {
                run_static_workflow(&ctx, input).await
            } else {
                SagaCoordinator::new(&ctx, input).execute().await
            };
            ctx.gate.lock();

            let outcome = match result {
                Ok(output) => WorkflowOutcome::Completed(output),
                Err(err) => WorkflowOutcome::Failed {
                    reason: err.to_string(),
                },
            };
            *close_time.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
            outcome_tx.send_replace(Some(outcome));
        });

        tracing::info!("workflow started");
        evict_closed(&mut executions, self.inner.closed_retention);
        executions.insert(workflow_id.to_string(), execution.clone());
        Ok(WorkflowHandle {
            workflow_id: workflow_id.to_string(),
            execution,
        })
    }

    /// Returns a handle to the most recent execution with `workflow_id`.
    pub fn handle(&self, workflow_id: &str) -> Result<WorkflowHandle, SagaError> {
        self.inner
            .executions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workflow_id)
            .map(|execution| WorkflowHandle {
                workflow_id: workflow_id.to_string(),
                execution: execution.clone(),
            })
            .ok_or_else(|| SagaError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Starts a shipping workflow, or attaches to the running one with the same ID.
    fn start_shipping(
        &self,
        parent: &WorkflowInfo,
        options: ChildWorkflowOptions,
        input: ShippingInput,
    ) -> ChildHandle {
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let workflow_id = options.workflow_id;
        children.retain(|_, entry| entry.is_running());

        // The attached caller does not own the child, so its handle never terminates it.
        if let Some(entry) = children.get(&workflow_id) {
            tracing::info!(%workflow_id, "attaching to running shipping workflow");
            return ChildHandle::new(
                workflow_id,
                entry.outcome.clone(),
                entry.abort.clone(),
                ParentClosePolicy::Abandon,
            );
        }

        let ctx = ExecutionContext {
            runtime: self.clone(),
            info: WorkflowInfo {
                workflow_id: workflow_id.clone(),
                workflow_type: SHIPPING_WORKFLOW_TYPE.to_string(),
                scenario: Scenario::Default,
                parent_workflow_id: Some(parent.workflow_id.clone()),
            },
            progress: ProgressTracker::new(),
            gate: AddressGate::new(),
            search_attributes: SearchAttributes::default(),
        };
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let own_outcome = outcome_rx.clone();
        let child_id = workflow_id.clone();
        let task = tokio::spawn(async move {
            let outcome = ShippingWorkflow::run(&ctx, input)
                .await
                .map_err(|err| err.to_string());
            outcome_tx.send_replace(Some(outcome));
            ctx.runtime.forget_child(&child_id, &own_outcome);
        });

        let abort = task.abort_handle();
        children.insert(
            workflow_id.clone(),
            ChildEntry {
                outcome: outcome_rx.clone(),
                abort: abort.clone(),
            },
        );
        ChildHandle::new(workflow_id, outcome_rx, abort, options.parent_close_policy)
    }

    /// Removes a finished child's entry unless a newer child reuses its ID.
    fn forget_child(&self, workflow_id: &str, outcome: &watch::Receiver<Option<ChildOutcome>>) {
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if children
            .get(workflow_id)
            .is_some_and(|entry| entry.outcome.same_channel(outcome))
        {
            children.remove(workflow_id);
        }
    }
}

/// Client-side handle to one workflow execution.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    workflow_id: String,
    execution: Execution,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn workflow_type(&self) -> &str {
        &self.execution.info.workflow_type
    }

    /// Answers a named query. Only `getProgress` is supported.
    pub fn query(&self, name: &str) -> Result<u8, SagaError> {
        if name != QUERY_PROGRESS {
            return Err(SagaError::UnknownQuery(name.to_string()));
        }
        Ok(self.progress())
    }

    pub fn progress(&self) -> u8 {
        self.execution.progress.query()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.execution.progress.snapshot()
    }

    /// Delivers the "UpdateOrder" signal.
    pub fn signal_update_order(&self, input: UpdateOrderInput) {
        self.execution.gate.signal(input);
    }

    /// Sends the "UpdateOrder" update and waits for its answer.
    pub fn update_order(&self, input: UpdateOrderInput) -> Result<String, SagaError> {
        self.execution.gate.update(input)
    }

    pub fn search_attributes(&self) -> BTreeMap<String, String> {
        self.execution
            .search_attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the outcome if the execution has closed.
    pub fn outcome(&self) -> Option<WorkflowOutcome> {
        self.execution.outcome.borrow().clone()
    }

    /// Waits for the execution to close.
    pub async fn result(&self) -> WorkflowOutcome {
        let mut outcome = self.execution.outcome.clone();
        match outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or_else(|| WorkflowOutcome::Failed {
                reason: "workflow produced no result".to_string(),
            }),
            Err(_) => WorkflowOutcome::Failed {
                reason: "workflow terminated".to_string(),
            },
        }
    }

    pub fn describe(&self) -> WorkflowDescription {
        let status = match self.outcome() {
            None => ExecutionStatus::Running,
            Some(WorkflowOutcome::Completed(_)) => ExecutionStatus::Completed,
            Some(WorkflowOutcome::Failed { .. }) => ExecutionStatus::Failed,
        };
        let snapshot = self.snapshot();
        WorkflowDescription {
            workflow_id: self.workflow_id.clone(),
            workflow_type: self.execution.info.workflow_type.clone(),
            status,
            state: snapshot.state,
            progress: snapshot.percent,
            start_time: self.execution.start_time,
            close_time: *self
                .execution
                .close_time
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// [`WorkflowContext`] of one execution hosted by a [`LocalRuntime`].
pub struct ExecutionContext<A: OrderActivities> {
    runtime: LocalRuntime<A>,
    info: WorkflowInfo,
    progress: ProgressTracker,
    gate: AddressGate,
    search_attributes: SearchAttributes,
}

#[async_trait]
impl<A: OrderActivities> WorkflowContext for ExecutionContext<A> {
    type Activities = A;

    fn info(&self) -> &WorkflowInfo {
        &self.info
    }

    fn settings(&self) -> &WorkflowSettings {
        self.runtime.settings()
    }

    fn activities(&self) -> &A {
        self.runtime.activities()
    }

    fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    fn gate(&self) -> &AddressGate {
        &self.gate
    }

    async fn execute_activity<T, F, Fut>(
        &self,
        activity: &str,
        options: &ActivityOptions,
        call: F,
    ) -> Result<T, SagaError>
    where
        T: Send,
        F: Fn(ActivityInfo) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ActivityError>> + Send,
    {
        execute_with_retry(&self.info.workflow_id, activity, options, call).await
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn start_shipping_child(
        &self,
        options: ChildWorkflowOptions,
        input: ShippingInput,
    ) -> Result<ChildHandle, SagaError> {
        Ok(self.runtime.start_shipping(&self.info, options, input))
    }

    async fn execute_shipping_operation(&self, input: ShippingInput) -> Result<(), SagaError> {
        let options = ChildWorkflowOptions {
            workflow_id: shipment_workflow_id(&input.order.order_id, &input.item),
            parent_close_policy: ParentClosePolicy::Abandon,
        };
        tracing::info!(workflow_id = %options.workflow_id, "calling shipping service operation");
        self.runtime
            .start_shipping(&self.info, options, input)
            .result()
            .await
    }

    fn upsert_search_attribute(&self, key: &str, value: &str) {
        tracing::info!(key, value, "upserting search attribute");
        self.search_attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}
