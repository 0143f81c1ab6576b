//! Domain events - committed state transitions fanned out to clients
//!
//! Every successful mutation commits exactly one of these. Events are
//! advisory: a client that misses one (reconnect, dropped buffer) must
//! re-fetch authoritative state over request/response rather than
//! patch blindly.
//!
//! Routing is decided up front: [`DomainEvent::channels`] names the
//! broadcast channels an event belongs to, so connections never
//! re-derive interest by string-matching ids.

use crate::models::{AttendanceRecord, Order, OrderItem, Payment, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named broadcast group, fixed per connection at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Every staff dashboard: table/order/stock/payment events
    GlobalStaff,
    /// Kitchen and order screens: line-item events
    Kitchen,
    /// One dining session (customer device + staff detail views)
    Order(i64),
    /// One user's attendance widget
    User(i64),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::GlobalStaff => write!(f, "global-staff"),
            Channel::Kitchen => write!(f, "kitchen"),
            Channel::Order(id) => write!(f, "order:{id}"),
            Channel::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Event payload - affected ids plus new-state snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Table occupancy and/or order status changed (open, bill
    /// requested, cancel). Carries both snapshots since they change
    /// together.
    TableStateChanged { table: Table, order: Order },

    OrderItemAdded {
        order_id: i64,
        table_id: i64,
        /// Display number for kitchen tickets
        table_number: u32,
        item: OrderItem,
    },

    OrderItemDelivered {
        order_id: i64,
        table_id: i64,
        item: OrderItem,
    },

    /// Payment closed the order and freed the table, in one commit
    PaymentRecorded {
        payment: Payment,
        table: Table,
        order: Order,
    },

    AttendanceChanged {
        user_id: i64,
        record: AttendanceRecord,
        clocked_in: bool,
    },
}

/// Domain event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event unique ID
    pub event_id: String,
    /// Server timestamp (Unix milliseconds)
    pub timestamp: i64,
    pub payload: EventPayload,
}

impl DomainEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: crate::util::now_millis(),
            payload,
        }
    }

    /// Wire name of the event, stable across versions
    pub fn name(&self) -> &'static str {
        match self.payload {
            EventPayload::TableStateChanged { .. } => "table_state_changed",
            EventPayload::OrderItemAdded { .. } => "order_item_added",
            EventPayload::OrderItemDelivered { .. } => "order_item_delivered",
            EventPayload::PaymentRecorded { .. } => "payment_recorded",
            EventPayload::AttendanceChanged { .. } => "attendance_changed",
        }
    }

    /// Channels this event is delivered on
    pub fn channels(&self) -> Vec<Channel> {
        match &self.payload {
            EventPayload::TableStateChanged { order, .. } => {
                vec![Channel::GlobalStaff, Channel::Order(order.order_id)]
            }
            EventPayload::OrderItemAdded { order_id, .. }
            | EventPayload::OrderItemDelivered { order_id, .. } => vec![
                Channel::GlobalStaff,
                Channel::Kitchen,
                Channel::Order(*order_id),
            ],
            EventPayload::PaymentRecorded { order, .. } => {
                vec![Channel::GlobalStaff, Channel::Order(order.order_id)]
            }
            EventPayload::AttendanceChanged { user_id, .. } => vec![Channel::User(*user_id)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, TableStatus};

    fn sample_order(order_id: i64, table_id: i64) -> Order {
        Order {
            order_id,
            order_token: "tok".to_string(),
            table_id,
            service_type: "ชาบู".to_string(),
            customer_quantity: 2,
            plan_id: 1,
            plan_price_per_person: 29900,
            charged_total: 59800,
            start_time: 0,
            status: OrderStatus::Active,
            closed_time: None,
        }
    }

    #[test]
    fn channel_display_forms() {
        assert_eq!(Channel::GlobalStaff.to_string(), "global-staff");
        assert_eq!(Channel::Kitchen.to_string(), "kitchen");
        assert_eq!(Channel::Order(42).to_string(), "order:42");
        assert_eq!(Channel::User(7).to_string(), "user:7");
    }

    #[test]
    fn table_state_changed_routes_to_staff_and_order() {
        let event = DomainEvent::new(EventPayload::TableStateChanged {
            table: Table {
                table_id: 5,
                number: 5,
                seat_capacity: 4,
                status: TableStatus::Occupied,
            },
            order: sample_order(100, 5),
        });
        assert_eq!(event.name(), "table_state_changed");
        assert_eq!(
            event.channels(),
            vec![Channel::GlobalStaff, Channel::Order(100)]
        );
    }

    #[test]
    fn item_added_routes_to_kitchen_too() {
        let event = DomainEvent::new(EventPayload::OrderItemAdded {
            order_id: 100,
            table_id: 5,
            table_number: 5,
            item: OrderItem {
                order_detail_id: 1,
                order_id: 100,
                menu_id: 7,
                quantity: 2,
                status: Default::default(),
                created_at: 0,
                delivered_at: None,
            },
        });
        assert!(event.channels().contains(&Channel::Kitchen));
        assert!(event.channels().contains(&Channel::Order(100)));
    }

    #[test]
    fn attendance_routes_to_single_user() {
        let event = DomainEvent::new(EventPayload::AttendanceChanged {
            user_id: 9,
            record: AttendanceRecord {
                attendance_id: 1,
                user_id: 9,
                clock_in_time: 0,
                clock_out_time: None,
            },
            clocked_in: true,
        });
        assert_eq!(event.channels(), vec![Channel::User(9)]);
    }
}
