//! Order workflow endpoints: start, inspect, correct, await.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderInput, OrderOutput, UpdateOrderInput};
use saga::order_fulfillment::{QUERY_PROGRESS, WORKFLOW_TYPE, order_workflow_id};
use saga::{
    ALL_SCENARIOS, ExecutionStatus, LocalRuntime, SagaState, Scenario, SimulatedActivities,
    WorkflowHandle, WorkflowOutcome,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Address used when a start request does not carry one.
pub const DEFAULT_ADDRESS: &str = "123 Main St";

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub runtime: LocalRuntime<SimulatedActivities>,
}

impl AppState {
    fn handle(&self, order_id: &str) -> Result<WorkflowHandle, ApiError> {
        let workflow_id = order_workflow_id(&OrderId::new(order_id));
        Ok(self.runtime.handle(&workflow_id)?)
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartOrderRequest {
    pub order_id: Option<String>,
    pub address: Option<String>,
    /// Scenario suffix (`HappyPath`) or full workflow type; absent runs the static workflow.
    pub scenario: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderStartedResponse {
    pub workflow_id: String,
    pub order_id: String,
    pub workflow_type: String,
}

#[derive(Serialize)]
pub struct OrderStatusResponse {
    pub workflow_id: String,
    pub workflow_type: String,
    pub status: ExecutionStatus,
    pub state: SagaState,
    pub progress: u8,
    pub label: String,
    pub search_attributes: BTreeMap<String, String>,
    pub outcome: Option<WorkflowOutcome>,
    pub start_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct ProgressResponse {
    pub progress: u8,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub result: String,
}

#[derive(Serialize)]
pub struct ScenarioResponse {
    pub scenario: String,
    pub workflow_type: String,
}

/// Maps a requested scenario to a workflow type.
fn resolve_workflow_type(scenario: Option<&str>) -> Result<String, ApiError> {
    match scenario {
        None | Some("") => Ok(WORKFLOW_TYPE.to_string()),
        Some(name) if name.starts_with(WORKFLOW_TYPE) => Ok(name.to_string()),
        Some(name) => Scenario::from_suffix(name)
            .map(|scenario| scenario.workflow_type())
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown scenario: {name}"))),
    }
}

// -- Handlers --

/// POST /orders: start an order workflow.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartOrderRequest>,
) -> Result<(StatusCode, Json<OrderStartedResponse>), ApiError> {
    let workflow_type = resolve_workflow_type(req.scenario.as_deref())?;
    let order_id = req.order_id.map(OrderId::new).unwrap_or_else(OrderId::generate);
    let address = req.address.unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let workflow_id = order_workflow_id(&order_id);

    let handle = state.runtime.start_workflow(
        &workflow_type,
        &workflow_id,
        OrderInput::new(order_id.clone(), address),
    )?;
    tracing::info!(workflow_id = handle.workflow_id(), %workflow_type, "order workflow started");

    Ok((
        StatusCode::CREATED,
        Json(OrderStartedResponse {
            workflow_id: handle.workflow_id().to_string(),
            order_id: order_id.to_string(),
            workflow_type,
        }),
    ))
}

/// GET /orders/{id}: describe the order's workflow execution.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let handle = state.handle(&id)?;
    let description = handle.describe();
    let snapshot = handle.snapshot();

    Ok(Json(OrderStatusResponse {
        workflow_id: description.workflow_id,
        workflow_type: description.workflow_type,
        status: description.status,
        state: snapshot.state,
        progress: snapshot.percent,
        label: snapshot.status,
        search_attributes: handle.search_attributes(),
        outcome: handle.outcome(),
        start_time: description.start_time,
        close_time: description.close_time,
    }))
}

/// GET /orders/{id}/progress: the `getProgress` query.
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let progress = state.handle(&id)?.query(QUERY_PROGRESS)?;
    Ok(Json(ProgressResponse { progress }))
}

/// POST /orders/{id}/signal: the "UpdateOrder" signal; fire and forget.
#[tracing::instrument(skip(state, input))]
pub async fn signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<UpdateOrderInput>,
) -> Result<StatusCode, ApiError> {
    state.handle(&id)?.signal_update_order(input);
    Ok(StatusCode::ACCEPTED)
}

/// POST /orders/{id}/update: the "UpdateOrder" update; validated.
#[tracing::instrument(skip(state, input))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<UpdateOrderInput>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let result = state.handle(&id)?.update_order(input)?;
    Ok(Json(UpdateResponse { result }))
}

/// GET /orders/{id}/result: waits for the workflow to close.
pub async fn result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderOutput>, ApiError> {
    match state.handle(&id)?.result().await {
        WorkflowOutcome::Completed(output) => Ok(Json(output)),
        WorkflowOutcome::Failed { reason } => Err(ApiError::WorkflowFailed(reason)),
    }
}

/// GET /scenarios: the workflow types this worker hosts.
pub async fn scenarios() -> Json<Vec<ScenarioResponse>> {
    let static_workflow = ScenarioResponse {
        scenario: "Static".to_string(),
        workflow_type: WORKFLOW_TYPE.to_string(),
    };
    let scenarios = std::iter::once(static_workflow)
        .chain(ALL_SCENARIOS.iter().map(|scenario| ScenarioResponse {
            scenario: scenario.suffix().to_string(),
            workflow_type: scenario.workflow_type(),
        }))
        .collect();
    Json(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_workflow_type() {
        assert_eq!(resolve_workflow_type(None).unwrap(), "OrderWorkflow");
        assert_eq!(
            resolve_workflow_type(Some("HappyPath")).unwrap(),
            "OrderWorkflowHappyPath"
        );
        assert_eq!(
            resolve_workflow_type(Some("OrderWorkflowChildWorkflow")).unwrap(),
            "OrderWorkflowChildWorkflow"
        );
        assert!(matches!(
            resolve_workflow_type(Some("Teleport")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
