use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of an order, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Creates an order ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random six-digit order ID.
    pub fn generate() -> Self {
        let digits = Uuid::new_v4().as_u128() % 1_000_000;
        Self(format!("{digits:06}"))
    }

    /// Returns the order ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Input that starts an order saga.
///
/// `address` is the only mutable field: it can be corrected once by a
/// human-in-the-loop signal or update before shipping begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInput {
    #[serde(rename = "OrderId", alias = "orderId", alias = "order_id")]
    pub order_id: OrderId,
    #[serde(rename = "Address", alias = "address")]
    pub address: String,
}

impl OrderInput {
    /// Creates a new order input.
    pub fn new(order_id: impl Into<OrderId>, address: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            address: address.into(),
        }
    }
}

/// A catalog line item returned by the item lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub description: String,
    pub quantity: NonZeroU32,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(id: i64, description: impl Into<String>, quantity: NonZeroU32) -> Self {
        Self {
            id,
            description: description.into(),
            quantity,
        }
    }
}

/// Result of a successfully completed order saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOutput {
    #[serde(rename = "trackingId")]
    pub tracking_id: String,
    pub address: String,
}

impl OrderOutput {
    /// Creates the output with a freshly generated tracking ID.
    pub fn with_new_tracking_id(address: impl Into<String>) -> Self {
        Self {
            tracking_id: Uuid::new_v4().to_string(),
            address: address.into(),
        }
    }
}

/// Payload of the "UpdateOrder" signal and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderInput {
    #[serde(rename = "Address", alias = "address")]
    pub address: String,
}

impl UpdateOrderInput {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Request to ship a single item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInput {
    #[serde(rename = "Order")]
    pub order: OrderInput,
    #[serde(rename = "Item")]
    pub item: OrderItem,
}

impl ShippingInput {
    pub fn new(order: OrderInput, item: OrderItem) -> Self {
        Self { order, item }
    }
}
