//! Shared order types exchanged between the saga core, its activities and the HTTP worker.

pub mod types;

pub use types::{OrderId, OrderInput, OrderItem, OrderOutput, ShippingInput, UpdateOrderInput};
