//! Connect-time declaration for event subscribers
//!
//! A device declares what it is exactly once, when it connects; the
//! hub computes its channel set from the declaration and the set is
//! fixed for the connection's lifetime. Reconnecting creates a brand
//! new connection (and for customers, a fresh token resolution, which
//! is what survives a server restart).

use serde::{Deserialize, Serialize};

/// Declared role of a connecting device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Staff dashboard - receives the global floor feed
    Staff,
    /// Kitchen / order screen - receives line-item events
    Kitchen,
    /// Per-table customer ordering session - must present an order
    /// token
    Customer,
}

/// Connect-time declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub role: Role,
    /// Order token from the customer URL; staff may also present one
    /// to follow a single order's detail view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_token: Option<String>,
    /// Staff user id, subscribes the operator's attendance widget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl ConnectRequest {
    pub fn staff() -> Self {
        Self {
            role: Role::Staff,
            order_token: None,
            user_id: None,
        }
    }

    pub fn staff_user(user_id: i64) -> Self {
        Self {
            role: Role::Staff,
            order_token: None,
            user_id: Some(user_id),
        }
    }

    pub fn kitchen() -> Self {
        Self {
            role: Role::Kitchen,
            order_token: None,
            user_id: None,
        }
    }

    pub fn customer(order_token: impl Into<String>) -> Self {
        Self {
            role: Role::Customer,
            order_token: Some(order_token.into()),
            user_id: None,
        }
    }
}
