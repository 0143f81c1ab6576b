//! Mutation request payloads
//!
//! Validated before any lock is taken; a request failing these checks
//! never reaches the lifecycle engine.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Open a free table and start an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OpenTableRequest {
    /// Must also be ≤ the table's seat capacity (checked against the
    /// table inside the critical section)
    #[validate(range(min = 1))]
    pub customer_quantity: u32,
    pub plan_id: i64,
    #[validate(length(min = 1))]
    pub service_type: String,
}

/// Record the payment that closes an order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentRequest {
    #[validate(length(min = 1))]
    pub method: String,
    /// Amount in minor currency units
    #[validate(range(min = 1))]
    pub total: i64,
}

/// Add a line item to an active order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddItemRequest {
    pub menu_id: i64,
    #[validate(range(min = 1))]
    pub quantity: u32,
}
