//! Integration tests for the order saga running on the local runtime.

use std::time::Duration;

use common::{OrderId, OrderInput, UpdateOrderInput};
use saga::order_fulfillment::{
    ACTIVITY_CHARGE_CUSTOMER, ACTIVITY_CHECK_FRAUD, ACTIVITY_GET_ITEMS, ACTIVITY_PREPARE_SHIPMENT,
    ACTIVITY_SHIP_ORDER, ACTIVITY_UNDO_CHARGE_CUSTOMER, ACTIVITY_UNDO_PREPARE_SHIPMENT,
    ORDER_STATUS_ATTRIBUTE, QUERY_PROGRESS, STATUS_ORDER_COMPLETED, order_workflow_id,
};
use saga::{
    ExecutionStatus, LocalRuntime, RuntimeConfig, SagaError, SagaState, Scenario,
    SimulatedActivities, SimulatedLatency, WorkflowHandle, WorkflowOutcome,
};

struct TestHarness {
    runtime: LocalRuntime<SimulatedActivities>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_latency(SimulatedLatency::instant())
    }

    fn with_latency(latency: SimulatedLatency) -> Self {
        let activities = SimulatedActivities::with_latency(latency).recording();
        Self {
            runtime: LocalRuntime::new(activities, RuntimeConfig::instant().settings()),
        }
    }

    /// Every shipment takes exactly `ship`; all other steps are instant.
    fn with_ship_latency(ship: Duration) -> Self {
        Self::with_latency(SimulatedLatency {
            ship_min: ship,
            ship_max: ship,
            ..SimulatedLatency::instant()
        })
    }

    fn activities(&self) -> &SimulatedActivities {
        self.runtime.activities()
    }

    fn start(&self, workflow_type: &str, order_id: &str, address: &str) -> WorkflowHandle {
        let workflow_id = order_workflow_id(&OrderId::new(order_id));
        self.runtime
            .start_workflow(workflow_type, &workflow_id, OrderInput::new(order_id, address))
            .unwrap()
    }

    fn start_scenario(&self, scenario: Scenario) -> WorkflowHandle {
        self.start(&scenario.workflow_type(), "654321", "123 Main St")
    }

    fn undo_activities(&self) -> Vec<&'static str> {
        self.activities()
            .invoked_activities()
            .into_iter()
            .filter(|a| *a == ACTIVITY_UNDO_CHARGE_CUSTOMER || *a == ACTIVITY_UNDO_PREPARE_SHIPMENT)
            .collect()
    }
}

fn completed(outcome: WorkflowOutcome) -> common::OrderOutput {
    match outcome {
        WorkflowOutcome::Completed(output) => output,
        WorkflowOutcome::Failed { reason } => panic!("expected completion, got failure: {reason}"),
    }
}

fn failed(outcome: WorkflowOutcome) -> String {
    match outcome {
        WorkflowOutcome::Failed { reason } => reason,
        WorkflowOutcome::Completed(output) => panic!("expected failure, got {output:?}"),
    }
}

#[tokio::test]
async fn test_happy_path_ships_every_item() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::HappyPath);

    let output = completed(handle.result().await);

    assert_eq!(output.address, "123 Main St");
    assert!(uuid::Uuid::parse_str(&output.tracking_id).is_ok());
    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 3);
    assert_eq!(handle.progress(), 100);
    assert_eq!(handle.snapshot().state, SagaState::Completed);
    assert_eq!(handle.snapshot().status, STATUS_ORDER_COMPLETED);
    assert!(harness.undo_activities().is_empty());

    let invoked = harness.activities().invoked_activities();
    assert_eq!(
        &invoked[..4],
        &[
            ACTIVITY_GET_ITEMS,
            ACTIVITY_CHECK_FRAUD,
            ACTIVITY_PREPARE_SHIPMENT,
            ACTIVITY_CHARGE_CUSTOMER
        ]
    );
}

#[tokio::test]
async fn test_shipments_cover_each_catalog_item() {
    let harness = TestHarness::new();
    completed(harness.start_scenario(Scenario::HappyPath).result().await);

    let mut shipped: Vec<i64> = harness
        .activities()
        .invocations()
        .into_iter()
        .filter(|i| i.activity == ACTIVITY_SHIP_ORDER)
        .filter_map(|i| i.item_id)
        .collect();
    shipped.sort_unstable();
    assert_eq!(shipped, vec![654300, 654321, 654322]);
}

#[tokio::test]
async fn test_non_recoverable_charge_unwinds_prepare_shipment() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::NonRecoverableFailure);

    let reason = failed(handle.result().await);

    assert!(reason.contains("credit card invalid"), "reason: {reason}");
    assert_eq!(harness.activities().count(ACTIVITY_CHARGE_CUSTOMER), 1);
    assert_eq!(harness.undo_activities(), vec![ACTIVITY_UNDO_PREPARE_SHIPMENT]);
    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 0);
    assert_eq!(handle.snapshot().state, SagaState::Failed);
    assert_eq!(handle.describe().status, ExecutionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_api_failure_retries_until_fifth_attempt() {
    let harness = TestHarness::new();
    let started = tokio::time::Instant::now();
    let handle = harness.start_scenario(Scenario::ApiFailure);

    completed(handle.result().await);

    assert_eq!(harness.activities().count(ACTIVITY_CHARGE_CUSTOMER), 5);
    let attempts: Vec<u32> = harness
        .activities()
        .invocations()
        .into_iter()
        .filter(|i| i.activity == ACTIVITY_CHARGE_CUSTOMER)
        .map(|i| i.attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    // Backoff 1s + 2s + 4s + 8s between the five attempts.
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert!(harness.undo_activities().is_empty());
}

#[tokio::test]
async fn test_fatal_defect_skips_compensation() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::RecoverableFailure);

    let reason = failed(handle.result().await);

    assert!(reason.contains("Simulated bug - fix me!"), "reason: {reason}");
    assert_eq!(harness.activities().count(ACTIVITY_CHARGE_CUSTOMER), 1);
    assert!(harness.undo_activities().is_empty());
    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 0);
    assert_eq!(handle.snapshot().state, SagaState::Failed);
}

#[tokio::test]
async fn test_fraud_rejection_fails_without_compensation() {
    let harness = TestHarness::new();
    harness.activities().set_fail_fraud_check(true);
    let handle = harness.start_scenario(Scenario::HappyPath);

    let reason = failed(handle.result().await);

    assert!(reason.contains(ACTIVITY_CHECK_FRAUD), "reason: {reason}");
    assert_eq!(harness.activities().count(ACTIVITY_PREPARE_SHIPMENT), 0);
    assert!(harness.undo_activities().is_empty());
    assert_eq!(handle.snapshot().state, SagaState::Failed);
}

#[tokio::test]
async fn test_ship_failure_unwinds_charge_then_prepare() {
    let harness = TestHarness::new();
    harness.activities().set_fail_ship_item(Some(654322));
    let handle = harness.start_scenario(Scenario::HappyPath);

    let reason = failed(handle.result().await);

    assert!(reason.contains("carrier rejected item 654322"), "reason: {reason}");
    assert_eq!(
        harness.undo_activities(),
        vec![ACTIVITY_UNDO_CHARGE_CUSTOMER, ACTIVITY_UNDO_PREPARE_SHIPMENT]
    );
    assert_ne!(handle.progress(), 100);
    assert_eq!(handle.snapshot().state, SagaState::Failed);
}

#[tokio::test]
async fn test_compensation_failure_propagates() {
    let harness = TestHarness::new();
    harness.activities().set_fail_ship_item(Some(654300));
    harness
        .activities()
        .set_fail_undo(Some(ACTIVITY_UNDO_CHARGE_CUSTOMER));
    let handle = harness.start_scenario(Scenario::HappyPath);

    let reason = failed(handle.result().await);

    assert!(reason.contains("Compensation step 'UndoChargeCustomer' failed"), "reason: {reason}");
    // The remaining undo does not run once one fails.
    assert_eq!(harness.undo_activities(), vec![ACTIVITY_UNDO_CHARGE_CUSTOMER]);
    assert_eq!(handle.snapshot().state, SagaState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_signal_gate_times_out_with_original_address() {
    let harness = TestHarness::new();
    let started = tokio::time::Instant::now();
    let handle = harness.start_scenario(Scenario::HumanInLoopSignal);

    let output = completed(handle.result().await);

    assert_eq!(output.address, "123 Main St");
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 3);
}

#[tokio::test(start_paused = true)]
async fn test_signal_overwrites_address() {
    let harness = TestHarness::new();
    let started = tokio::time::Instant::now();
    let handle = harness.start_scenario(Scenario::HumanInLoopSignal);

    handle.signal_update_order(UpdateOrderInput::new("Unvalidated Lane"));
    handle.signal_update_order(UpdateOrderInput::new("789 Pine Rd"));
    let output = completed(handle.result().await);

    assert_eq!(output.address, "789 Pine Rd");
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_update_validates_and_overwrites_address() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::HumanInLoopUpdate);

    let rejected = handle.update_order(UpdateOrderInput::new("Oak Ave"));
    assert!(matches!(rejected, Err(SagaError::InvalidAddress(_))));

    let reply = handle
        .update_order(UpdateOrderInput::new("456 Oak Ave"))
        .unwrap();
    assert_eq!(reply, "Updated address: 456 Oak Ave");

    let output = completed(handle.result().await);
    assert_eq!(output.address, "456 Oak Ave");
}

#[tokio::test]
async fn test_update_after_completion_is_locked() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::HappyPath);
    completed(handle.result().await);

    assert!(matches!(
        handle.update_order(UpdateOrderInput::new("1 Late St")),
        Err(SagaError::AddressLocked)
    ));
    handle.signal_update_order(UpdateOrderInput::new("2 Late St"));
    assert_eq!(handle.progress(), 100);
}

#[tokio::test]
async fn test_child_workflows_ship_each_item() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::ChildWorkflow);

    completed(handle.result().await);

    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 3);
    assert_eq!(handle.snapshot().state, SagaState::Completed);
}

#[tokio::test]
async fn test_failed_child_workflow_compensates() {
    let harness = TestHarness::new();
    harness.activities().set_fail_ship_item(Some(654321));
    let handle = harness.start_scenario(Scenario::ChildWorkflow);

    let reason = failed(handle.result().await);

    assert!(reason.contains("shipment-654321-654321"), "reason: {reason}");
    assert_eq!(
        harness.undo_activities(),
        vec![ACTIVITY_UNDO_CHARGE_CUSTOMER, ACTIVITY_UNDO_PREPARE_SHIPMENT]
    );
}

#[tokio::test(start_paused = true)]
async fn test_item_shipments_are_dispatched_concurrently() {
    let ship = Duration::from_secs(2);
    for scenario in [Scenario::HappyPath, Scenario::ChildWorkflow, Scenario::ServiceOperation] {
        let harness = TestHarness::with_ship_latency(ship);
        let started = tokio::time::Instant::now();

        completed(harness.start_scenario(scenario).result().await);

        let elapsed = started.elapsed();
        assert_eq!(harness.activities().delivered_items().len(), 3);
        assert!(elapsed >= ship, "{scenario:?} took {elapsed:?}");
        assert!(elapsed < ship * 3, "{scenario:?} shipped sequentially in {elapsed:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_child_terminates_sibling_children() {
    let harness = TestHarness::with_ship_latency(Duration::from_secs(3));
    harness.activities().set_fail_ship_item(Some(654300));
    let handle = harness.start_scenario(Scenario::ChildWorkflow);

    let reason = failed(handle.result().await);
    assert!(reason.contains("shipment-654321-654300"), "reason: {reason}");

    // Well past the point where the siblings would have delivered.
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 3);
    assert!(harness.activities().delivered_items().is_empty());
    assert_eq!(
        harness.undo_activities(),
        vec![ACTIVITY_UNDO_CHARGE_CUSTOMER, ACTIVITY_UNDO_PREPARE_SHIPMENT]
    );
}

#[tokio::test]
async fn test_service_operation_ships_each_item() {
    let harness = TestHarness::new();
    let handle = harness.start("OrderWorkflowNexusOperation", "654321", "123 Main St");

    completed(handle.result().await);

    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 3);
}

#[tokio::test]
async fn test_advanced_visibility_publishes_status() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::AdvancedVisibility);

    completed(handle.result().await);

    let attributes = handle.search_attributes();
    assert_eq!(
        attributes.get(ORDER_STATUS_ATTRIBUTE).map(String::as_str),
        Some(STATUS_ORDER_COMPLETED)
    );
}

#[tokio::test]
async fn test_other_scenarios_do_not_publish_status() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::HappyPath);
    completed(handle.result().await);
    assert!(handle.search_attributes().is_empty());
}

#[tokio::test]
async fn test_static_workflow_completes() {
    let harness = TestHarness::new();
    let handle = harness.start("OrderWorkflow", "654300", "1 Static Way");

    let output = completed(handle.result().await);

    assert_eq!(output.address, "1 Static Way");
    assert_eq!(handle.query(QUERY_PROGRESS).unwrap(), 100);
    assert!(handle.snapshot().status.is_empty());
    assert_eq!(harness.activities().count(ACTIVITY_SHIP_ORDER), 3);
}

#[tokio::test]
async fn test_static_workflow_failure_is_not_compensated() {
    let harness = TestHarness::new();
    harness.activities().set_fail_ship_item(Some(654300));
    let handle = harness.start("OrderWorkflow", "654300", "1 Static Way");

    failed(handle.result().await);

    assert!(harness.undo_activities().is_empty());
    assert_eq!(handle.snapshot().state, SagaState::Failed);
}

#[tokio::test]
async fn test_unknown_suffix_runs_default_scenario() {
    let harness = TestHarness::new();
    let handle = harness.start("OrderWorkflowSomethingElse", "654321", "123 Main St");

    completed(handle.result().await);

    assert_eq!(harness.activities().count(ACTIVITY_CHARGE_CUSTOMER), 1);
    assert!(handle.search_attributes().is_empty());
}

#[tokio::test]
async fn test_progress_stays_at_100_after_completion() {
    let harness = TestHarness::new();
    let handle = harness.start_scenario(Scenario::HappyPath);
    completed(handle.result().await);

    for _ in 0..5 {
        assert_eq!(handle.query(QUERY_PROGRESS).unwrap(), 100);
    }
    let again = harness.runtime.handle(handle.workflow_id()).unwrap();
    assert_eq!(again.progress(), 100);
}
