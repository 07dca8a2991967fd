//! Saga coordinator for the order fulfillment workflows.

use std::time::{Duration, Instant};

use common::{OrderInput, OrderItem, OrderOutput, ShippingInput};
use futures_util::future::try_join_all;

use crate::activities::OrderActivities;
use crate::compensation::{Compensation, CompensationLedger};
use crate::context::{ChildWorkflowOptions, ParentClosePolicy, WorkflowContext};
use crate::error::SagaError;
use crate::order_fulfillment::{
    self, ACTIVITY_CHARGE_CUSTOMER, ACTIVITY_CHECK_FRAUD, ACTIVITY_GET_ITEMS,
    ACTIVITY_PREPARE_SHIPMENT, ACTIVITY_SHIP_ORDER, ORDER_STATUS_ATTRIBUTE, SIMULATED_BUG,
    STATUS_CHARGE_CUSTOMER, STATUS_CHECK_FRAUD, STATUS_ORDER_COMPLETED, STATUS_PREPARE_SHIPMENT,
    STATUS_SHIP_ORDER,
};
use crate::retry::ActivityOptions;
use crate::scenario::ShippingStrategy;
use crate::state::SagaState;

/// Orchestrates one order fulfillment saga against a [`WorkflowContext`].
///
/// The scenario variant drives fraud check, shipment preparation, charge
/// and per-item shipping, recording an undo action after each compensable
/// step. Failures once the ledger holds entries unwind it in reverse
/// before the error is returned.
pub struct SagaCoordinator<'a, C: WorkflowContext> {
    ctx: &'a C,
    input: OrderInput,
    ledger: CompensationLedger,
}

impl<'a, C: WorkflowContext> SagaCoordinator<'a, C> {
    pub fn new(ctx: &'a C, input: OrderInput) -> Self {
        Self {
            ctx,
            input,
            ledger: CompensationLedger::new(),
        }
    }

    /// Executes the scenario workflow selected by the context's workflow type.
    #[tracing::instrument(
        skip_all,
        fields(
            workflow_id = %self.ctx.info().workflow_id,
            scenario = %self.ctx.info().scenario,
            order_id = %self.input.order_id
        )
    )]
    pub async fn execute(mut self) -> Result<OrderOutput, SagaError> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let result = match self.run_forward().await {
            Ok(output) => Ok(output),
            Err(err) => self.fail(err).await,
        };

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        match &result {
            Ok(output) => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(tracking_id = %output.tracking_id, "saga completed");
            }
            Err(err) => {
                metrics::counter!("saga_failed").increment(1);
                tracing::warn!(error = %err, "saga failed");
            }
        }
        result
    }

    async fn run_forward(&mut self) -> Result<OrderOutput, SagaError> {
        let ctx = self.ctx;
        let scenario = ctx.info().scenario;
        let pacing = ctx.settings().pacing.clone();
        let activities = ctx.activities();

        let items = get_items(ctx).await?;

        ctx.progress().transition(SagaState::FraudChecking)?;
        self.set_status(STATUS_CHECK_FRAUD, 0);
        tracing::info!(step = ACTIVITY_CHECK_FRAUD, "saga step started");
        let order = &self.input;
        ctx.execute_activity(
            ACTIVITY_CHECK_FRAUD,
            &ActivityOptions::forward(),
            move |info| activities.check_fraud(info, order),
        )
        .await?;

        self.pause(pacing.after_fraud_check).await;
        self.set_status(STATUS_PREPARE_SHIPMENT, 25);
        ctx.progress().transition(SagaState::PreparingShipment)?;
        tracing::info!(step = ACTIVITY_PREPARE_SHIPMENT, "saga step started");
        let order = &self.input;
        ctx.execute_activity(
            ACTIVITY_PREPARE_SHIPMENT,
            &ActivityOptions::forward(),
            move |info| activities.prepare_shipment(info, order),
        )
        .await?;
        self.ledger
            .append(Compensation::UndoPrepareShipment(self.input.clone()));

        self.pause(pacing.after_prepare_shipment).await;
        self.set_status(STATUS_CHARGE_CUSTOMER, 50);
        ctx.progress().transition(SagaState::ChargingCustomer)?;
        tracing::info!(step = ACTIVITY_CHARGE_CUSTOMER, "saga step started");
        let order = &self.input;
        ctx.execute_activity(
            ACTIVITY_CHARGE_CUSTOMER,
            &ActivityOptions::forward(),
            move |info| activities.charge_customer(info, order, scenario),
        )
        .await?;
        self.ledger
            .append(Compensation::UndoChargeCustomer(self.input.clone()));

        self.pause(pacing.after_charge).await;
        self.set_status(STATUS_SHIP_ORDER, 75);

        if scenario.injects_defect() {
            return Err(SagaError::FatalDefect(SIMULATED_BUG.to_string()));
        }

        if let Some(channel) = scenario.gate_channel() {
            ctx.progress().transition(SagaState::AwaitingAddress)?;
            tracing::info!(?channel, "waiting for address correction");
            match ctx.gate().wait(ctx.settings().address_wait).await {
                Some(address) => {
                    tracing::info!(%address, "address corrected");
                    self.input.address = address;
                }
                None => tracing::info!("no address correction received, keeping original"),
            }
        }
        ctx.gate().lock();

        ctx.progress().transition(SagaState::Shipping)?;
        tracing::info!(step = ACTIVITY_SHIP_ORDER, items = items.len(), "saga step started");
        let strategy = scenario.shipping_strategy();
        try_join_all(items.iter().map(|item| self.ship_item(strategy, item))).await?;

        self.set_status(STATUS_ORDER_COMPLETED, 100);
        ctx.progress().transition(SagaState::Completed)?;
        Ok(OrderOutput::with_new_tracking_id(self.input.address.clone()))
    }

    /// Routes a forward failure to its terminal state.
    async fn fail(self, err: SagaError) -> Result<OrderOutput, SagaError> {
        let progress = self.ctx.progress();

        // An injected defect is not a business failure: nothing is undone.
        if matches!(err, SagaError::FatalDefect(_)) || self.ledger.is_empty() {
            progress.transition(SagaState::Failed)?;
            return Err(err);
        }

        progress.transition(SagaState::Compensating)?;
        tracing::warn!(error = %err, steps = self.ledger.len(), "saga step failed, compensating");
        let unwound = self.ledger.unwind_all(self.ctx).await;
        progress.transition(SagaState::Failed)?;
        unwound?;
        Err(err)
    }

    async fn ship_item(&self, strategy: ShippingStrategy, item: &OrderItem) -> Result<(), SagaError> {
        let ctx = self.ctx;
        let shipping = ShippingInput::new(self.input.clone(), item.clone());
        match strategy {
            ShippingStrategy::Activity => {
                let activities = ctx.activities();
                let shipping = &shipping;
                ctx.execute_activity(
                    ACTIVITY_SHIP_ORDER,
                    &ActivityOptions::forward(),
                    move |info| activities.ship_order(info, shipping),
                )
                .await
            }
            ShippingStrategy::ChildWorkflow => {
                let options = ChildWorkflowOptions {
                    workflow_id: order_fulfillment::shipment_workflow_id(&self.input.order_id, item),
                    parent_close_policy: ParentClosePolicy::Terminate,
                };
                let child = ctx.start_shipping_child(options, shipping)?;
                tracing::info!(child_workflow_id = child.workflow_id(), "started child workflow");
                child.result().await
            }
            ShippingStrategy::ServiceOperation => ctx.execute_shipping_operation(shipping).await,
        }
    }

    fn set_status(&self, label: &str, percent: u8) {
        self.ctx.progress().set_progress(percent, label);
        if self.ctx.info().scenario.publishes_status() {
            self.ctx.upsert_search_attribute(ORDER_STATUS_ATTRIBUTE, label);
        }
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.ctx.sleep(duration).await;
        }
    }
}

/// Runs the static `OrderWorkflow`: fixed steps, no ledger, no gate.
///
/// Any failure propagates directly and the saga ends Failed.
#[tracing::instrument(
    skip_all,
    fields(workflow_id = %ctx.info().workflow_id, order_id = %input.order_id)
)]
pub async fn run_static_workflow<C: WorkflowContext>(
    ctx: &C,
    input: OrderInput,
) -> Result<OrderOutput, SagaError> {
    metrics::counter!("saga_executions_total").increment(1);
    let saga_start = Instant::now();

    let result = static_steps(ctx, &input).await;
    if result.is_err() {
        ctx.progress().transition(SagaState::Failed)?;
    }

    metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
    match &result {
        Ok(_) => metrics::counter!("saga_completed").increment(1),
        Err(err) => {
            metrics::counter!("saga_failed").increment(1);
            tracing::warn!(error = %err, "saga failed");
        }
    }
    result
}

async fn static_steps<C: WorkflowContext>(
    ctx: &C,
    input: &OrderInput,
) -> Result<OrderOutput, SagaError> {
    let pacing = ctx.settings().pacing.clone();
    let activities = ctx.activities();
    let options = ActivityOptions::forward();
    let progress = ctx.progress();

    let items = get_items(ctx).await?;

    progress.transition(SagaState::FraudChecking)?;
    ctx.execute_activity(ACTIVITY_CHECK_FRAUD, &options, move |info| {
        activities.check_fraud(info, input)
    })
    .await?;
    progress.set_percent(25);
    ctx.sleep(pacing.after_fraud_check).await;

    progress.transition(SagaState::PreparingShipment)?;
    ctx.execute_activity(ACTIVITY_PREPARE_SHIPMENT, &options, move |info| {
        activities.prepare_shipment(info, input)
    })
    .await?;
    progress.set_percent(50);
    ctx.sleep(pacing.after_prepare_shipment).await;

    progress.transition(SagaState::ChargingCustomer)?;
    let scenario = ctx.info().scenario;
    ctx.execute_activity(ACTIVITY_CHARGE_CUSTOMER, &options, move |info| {
        activities.charge_customer(info, input, scenario)
    })
    .await?;
    progress.set_percent(75);
    ctx.sleep(pacing.after_charge).await;

    progress.transition(SagaState::Shipping)?;
    let options = &options;
    let shipments = items.iter().map(|item| {
        let shipping = ShippingInput::new(input.clone(), item.clone());
        async move {
            let shipping = &shipping;
            ctx.execute_activity(ACTIVITY_SHIP_ORDER, options, move |info| {
                activities.ship_order(info, shipping)
            })
            .await
        }
    });
    try_join_all(shipments).await?;
    progress.set_percent(100);
    ctx.sleep(pacing.after_shipping).await;

    progress.transition(SagaState::Completed)?;
    Ok(OrderOutput::with_new_tracking_id(input.address.clone()))
}

async fn get_items<C: WorkflowContext>(ctx: &C) -> Result<Vec<OrderItem>, SagaError> {
    let activities = ctx.activities();
    ctx.execute_activity(ACTIVITY_GET_ITEMS, &ActivityOptions::local(), move |info| {
        activities.get_items(info)
    })
    .await
}
