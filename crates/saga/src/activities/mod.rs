//! Activity trait and simulated implementation for saga steps.

pub mod simulated;

use async_trait::async_trait;
use common::{OrderInput, OrderItem, ShippingInput};

use crate::error::ActivityError;
use crate::retry::ActivityInfo;
use crate::scenario::Scenario;

pub use simulated::{Invocation, SimulatedActivities, SimulatedLatency};

/// The remote operations an order saga invokes.
///
/// Each call is one attempt; retries are driven by the caller's
/// [`ActivityOptions`](crate::retry::ActivityOptions).
#[async_trait]
pub trait OrderActivities: Send + Sync + 'static {
    /// Looks up the items of the order.
    async fn get_items(&self, info: ActivityInfo) -> Result<Vec<OrderItem>, ActivityError>;

    async fn check_fraud(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError>;

    async fn prepare_shipment(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError>;

    /// Charges the customer; the scenario decides which fault, if any, is simulated.
    async fn charge_customer(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
        scenario: Scenario,
    ) -> Result<String, ActivityError>;

    /// Ships a single item.
    async fn ship_order(
        &self,
        info: ActivityInfo,
        input: &ShippingInput,
    ) -> Result<(), ActivityError>;

    async fn undo_prepare_shipment(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError>;

    async fn undo_charge_customer(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError>;
}
