//! Simulated activities with configurable latency and injectable failures.

use std::num::NonZeroU32;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderInput, OrderItem, ShippingInput};
use rand::Rng;

use super::OrderActivities;
use crate::error::ActivityError;
use crate::order_fulfillment::{
    ACTIVITY_CHARGE_CUSTOMER, ACTIVITY_CHECK_FRAUD, ACTIVITY_GET_ITEMS,
    ACTIVITY_PREPARE_SHIPMENT, ACTIVITY_SHIP_ORDER, ACTIVITY_UNDO_CHARGE_CUSTOMER,
    ACTIVITY_UNDO_PREPARE_SHIPMENT,
};
use crate::retry::ActivityInfo;
use crate::scenario::{ChargeFault, Scenario};

/// Attempt from which `charge_customer` stops injecting its fault.
const CHARGE_CONVERGES_AT_ATTEMPT: u32 = 5;

/// Simulated external latency of each operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedLatency {
    pub item_lookup: Duration,
    /// Fraud check, shipment preparation, charge and undo steps.
    pub step: Duration,
    pub ship_min: Duration,
    pub ship_max: Duration,
}

impl Default for SimulatedLatency {
    fn default() -> Self {
        Self {
            item_lookup: Duration::from_millis(100),
            step: Duration::from_millis(1000),
            ship_min: Duration::from_millis(1000),
            ship_max: Duration::from_millis(4000),
        }
    }
}

impl SimulatedLatency {
    /// No simulated latency at all.
    pub fn instant() -> Self {
        Self {
            item_lookup: Duration::ZERO,
            step: Duration::ZERO,
            ship_min: Duration::ZERO,
            ship_max: Duration::ZERO,
        }
    }
}

/// A recorded activity call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub activity: &'static str,
    pub order_id: String,
    pub item_id: Option<i64>,
    pub attempt: u32,
}

#[derive(Debug, Default)]
struct SimulatedState {
    recording: bool,
    invocations: Vec<Invocation>,
    delivered: Vec<i64>,
    fail_ship_item: Option<i64>,
    fail_undo: Option<&'static str>,
    fail_fraud_check: bool,
}

/// Activities that sleep instead of calling real services.
///
/// With [`recording`](Self::recording) enabled every call is kept so tests
/// can assert on dispatch counts and compensation order. A long-running
/// worker leaves it off.
#[derive(Debug, Clone, Default)]
pub struct SimulatedActivities {
    latency: SimulatedLatency,
    state: Arc<RwLock<SimulatedState>>,
}

impl SimulatedActivities {
    /// Creates activities with the default (realistic) latencies.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: SimulatedLatency) -> Self {
        Self {
            latency,
            state: Arc::default(),
        }
    }

    /// Creates activities that complete immediately.
    pub fn instant() -> Self {
        Self::with_latency(SimulatedLatency::instant())
    }

    /// Keeps every call and every delivered item from now on.
    pub fn recording(self) -> Self {
        self.write().recording = true;
        self
    }

    /// Makes shipping the given item fail non-retryably.
    pub fn set_fail_ship_item(&self, item_id: Option<i64>) {
        self.write().fail_ship_item = item_id;
    }

    /// Makes the named undo activity fail non-retryably.
    pub fn set_fail_undo(&self, activity: Option<&'static str>) {
        self.write().fail_undo = activity;
    }

    /// Makes the fraud check reject every order.
    pub fn set_fail_fraud_check(&self, fail: bool) {
        self.write().fail_fraud_check = fail;
    }

    /// Returns every recorded call, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.read().invocations.clone()
    }

    /// Returns the items whose shipment completed, in completion order.
    pub fn delivered_items(&self) -> Vec<i64> {
        self.read().delivered.clone()
    }

    /// Returns the names of recorded calls, in order.
    pub fn invoked_activities(&self) -> Vec<&'static str> {
        self.read().invocations.iter().map(|i| i.activity).collect()
    }

    /// Returns how many times the named activity was attempted.
    pub fn count(&self, activity: &str) -> usize {
        self.read()
            .invocations
            .iter()
            .filter(|i| i.activity == activity)
            .count()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SimulatedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SimulatedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, activity: &'static str, info: &ActivityInfo, order: &str, item: Option<i64>) {
        tracing::info!(
            activity,
            order_id = order,
            item_id = item,
            attempt = info.attempt,
            "activity started"
        );
        let mut state = self.write();
        if state.recording {
            state.invocations.push(Invocation {
                activity,
                order_id: order.to_string(),
                item_id: item,
                attempt: info.attempt,
            });
        }
    }

    async fn undo(
        &self,
        activity: &'static str,
        info: &ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError> {
        self.record(activity, info, input.order_id.as_str(), None);
        tokio::time::sleep(self.latency.step).await;

        if self.read().fail_undo == Some(activity) {
            return Err(ActivityError::non_retryable(format!(
                "{activity} rejected by downstream service"
            )));
        }
        Ok(input.order_id.to_string())
    }

    fn shipping_delay(&self) -> Duration {
        let min = self.latency.ship_min.as_millis() as u64;
        let max = self.latency.ship_max.as_millis() as u64;
        if max <= min {
            return self.latency.ship_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// The fixed three-item catalog, sorted by item ID.
pub fn catalog() -> Vec<OrderItem> {
    let one = NonZeroU32::MIN;
    let two = one.saturating_add(1);
    let mut items = vec![
        OrderItem::new(654300, "Table Top", one),
        OrderItem::new(654321, "Table Legs", two),
        OrderItem::new(654322, "Keypad", one),
    ];
    items.sort_by_key(|item| item.id);
    items
}

#[async_trait]
impl OrderActivities for SimulatedActivities {
    async fn get_items(&self, info: ActivityInfo) -> Result<Vec<OrderItem>, ActivityError> {
        self.record(ACTIVITY_GET_ITEMS, &info, &info.workflow_id, None);
        tokio::time::sleep(self.latency.item_lookup).await;
        Ok(catalog())
    }

    async fn check_fraud(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError> {
        self.record(ACTIVITY_CHECK_FRAUD, &info, input.order_id.as_str(), None);
        tokio::time::sleep(self.latency.step).await;

        if self.read().fail_fraud_check {
            return Err(ActivityError::non_retryable("order flagged as fraudulent"));
        }
        Ok(input.order_id.to_string())
    }

    async fn prepare_shipment(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError> {
        self.record(ACTIVITY_PREPARE_SHIPMENT, &info, input.order_id.as_str(), None);
        tokio::time::sleep(self.latency.step).await;
        Ok(input.order_id.to_string())
    }

    async fn charge_customer(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
        scenario: Scenario,
    ) -> Result<String, ActivityError> {
        self.record(ACTIVITY_CHARGE_CUSTOMER, &info, input.order_id.as_str(), None);
        tokio::time::sleep(self.latency.step / info.attempt.max(1)).await;

        let fault = if info.attempt < CHARGE_CONVERGES_AT_ATTEMPT {
            scenario.charge_fault()
        } else {
            ChargeFault::None
        };

        match fault {
            ChargeFault::ApiUnavailable => {
                tracing::info!(attempt = info.attempt, "charge customer API unavailable");
                Err(ActivityError::retryable(
                    "charge customer activity failed, API unavailable",
                ))
            }
            ChargeFault::InvalidCard => Err(ActivityError::non_retryable(
                "charge customer activity failed: credit card invalid",
            )),
            ChargeFault::None => Ok(input.order_id.to_string()),
        }
    }

    async fn ship_order(
        &self,
        info: ActivityInfo,
        input: &ShippingInput,
    ) -> Result<(), ActivityError> {
        self.record(
            ACTIVITY_SHIP_ORDER,
            &info,
            input.order.order_id.as_str(),
            Some(input.item.id),
        );
        if self.read().fail_ship_item == Some(input.item.id) {
            return Err(ActivityError::non_retryable(format!(
                "carrier rejected item {}",
                input.item.id
            )));
        }

        let delay = self.shipping_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "shipping delay");
        tokio::time::sleep(delay).await;

        let mut state = self.write();
        if state.recording {
            state.delivered.push(input.item.id);
        }
        Ok(())
    }

    async fn undo_prepare_shipment(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError> {
        self.undo(ACTIVITY_UNDO_PREPARE_SHIPMENT, &info, input).await
    }

    async fn undo_charge_customer(
        &self,
        info: ActivityInfo,
        input: &OrderInput,
    ) -> Result<String, ActivityError> {
        self.undo(ACTIVITY_UNDO_CHARGE_CUSTOMER, &info, input).await
    }
}
