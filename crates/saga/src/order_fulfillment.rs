//! Order saga names and constants shared by the workflows, the runtime and the HTTP worker.

use common::{OrderId, OrderItem};

/// Workflow type of the static happy-path workflow. Scenario workflows append a suffix.
pub const WORKFLOW_TYPE: &str = "OrderWorkflow";

/// Workflow type of the per-item shipping child workflow.
pub const SHIPPING_WORKFLOW_TYPE: &str = "ShippingChildWorkflow";

/// Query answered with the saga's percent complete.
pub const QUERY_PROGRESS: &str = "getProgress";

/// Name of both the address-correction signal and update.
pub const UPDATE_ORDER: &str = "UpdateOrder";

/// Keyword search attribute carrying the status label.
pub const ORDER_STATUS_ATTRIBUTE: &str = "OrderStatus";

/// Activity names.
pub const ACTIVITY_GET_ITEMS: &str = "GetItems";
pub const ACTIVITY_CHECK_FRAUD: &str = "CheckFraud";
pub const ACTIVITY_PREPARE_SHIPMENT: &str = "PrepareShipment";
pub const ACTIVITY_CHARGE_CUSTOMER: &str = "ChargeCustomer";
pub const ACTIVITY_SHIP_ORDER: &str = "ShipOrder";
pub const ACTIVITY_UNDO_PREPARE_SHIPMENT: &str = "UndoPrepareShipment";
pub const ACTIVITY_UNDO_CHARGE_CUSTOMER: &str = "UndoChargeCustomer";

/// Status labels published as the saga advances.
pub const STATUS_CHECK_FRAUD: &str = "Check Fraud";
pub const STATUS_PREPARE_SHIPMENT: &str = "Prepare Shipment";
pub const STATUS_CHARGE_CUSTOMER: &str = "Charge Customer";
pub const STATUS_SHIP_ORDER: &str = "Ship Order";
pub const STATUS_ORDER_COMPLETED: &str = "Order Completed";

/// Message of the injected defect in the bug scenario.
pub const SIMULATED_BUG: &str = "Simulated bug - fix me!";

/// Returns the workflow ID the HTTP worker uses for an order.
pub fn order_workflow_id(order_id: &OrderId) -> String {
    format!("order-{order_id}")
}

/// Returns the deterministic child workflow ID for shipping one item of an order.
pub fn shipment_workflow_id(order_id: &OrderId, item: &OrderItem) -> String {
    format!("shipment-{}-{}", order_id, item.id)
}
