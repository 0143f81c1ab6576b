//! Order, OrderItem and Payment Models

use serde::{Deserialize, Serialize};

/// Order lifecycle status
///
/// `Closed` and `Cancelled` are terminal; orders in those states are
/// immutable history and never reappear on the floor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Active,
    AwaitingPayment,
    Closed,
    Cancelled,
}

/// One dining session's running tab
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub order_id: i64,
    /// Unguessable token used in customer-facing URLs (QR slip)
    pub order_token: String,
    pub table_id: i64,
    pub service_type: String,
    pub customer_quantity: u32,
    pub plan_id: i64,
    /// Per-person price frozen at open-table time
    pub plan_price_per_person: i64,
    /// `plan_price_per_person × customer_quantity`, frozen at
    /// open-table time; reporting reflects what was charged, not the
    /// current catalog.
    pub charged_total: i64,
    pub start_time: i64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_time: Option<i64>,
}

impl Order {
    /// Active or AwaitingPayment — the order still occupies its table
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Active | OrderStatus::AwaitingPayment
        )
    }
}

/// Kitchen delivery status of a line item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[default]
    Pending,
    Delivered,
}

/// One line item (dish + quantity) within an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub order_detail_id: i64,
    pub order_id: i64,
    pub menu_id: i64,
    pub quantity: u32,
    #[serde(default)]
    pub status: ItemStatus,
    pub created_at: i64,
    /// Set exactly once, when the kitchen marks the item delivered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
}

/// Payment recorded against an order
///
/// One payment closes one order; partial payments are out of scope for
/// the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub payment_id: i64,
    pub order_id: i64,
    pub method: String,
    /// Amount in minor currency units
    pub total: i64,
    pub recorded_at: i64,
}
