//! Shipping child workflow: ships one item and terminates.

use common::ShippingInput;

use crate::activities::OrderActivities;
use crate::context::WorkflowContext;
use crate::error::SagaError;
use crate::order_fulfillment::ACTIVITY_SHIP_ORDER;
use crate::retry::ActivityOptions;

/// Ships a single order item. No compensation, no further decomposition.
pub struct ShippingWorkflow;

impl ShippingWorkflow {
    #[tracing::instrument(
        skip_all,
        fields(
            workflow_id = %ctx.info().workflow_id,
            parent_workflow_id = ctx.info().parent_workflow_id.as_deref(),
            order_id = %input.order.order_id,
            item_id = input.item.id
        )
    )]
    pub async fn run<C: WorkflowContext>(ctx: &C, input: ShippingInput) -> Result<(), SagaError> {
        tracing::info!("shipping workflow started");
        let activities = ctx.activities();
        let shipping = &input;
        ctx.execute_activity(
            ACTIVITY_SHIP_ORDER,
            &ActivityOptions::forward(),
            move |info| activities.ship_order(info, shipping),
        )
        .await
    }
}
