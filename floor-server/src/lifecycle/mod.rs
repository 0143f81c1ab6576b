//! Lifecycle engine - pure transition decisions
//!
//! Every rule about what a table, order, line item or attendance span
//! may do next lives here, as plain functions over snapshots:
//!
//! ```text
//! decide_*(current state, action) -> Transition | Rejection
//! ```
//!
//! No I/O, no locking, no clocks: the gateway pre-generates ids and
//! timestamps and passes them in (the same way receipt numbers are
//! minted before the storage transaction), so every branch is directly
//! unit-testable.

use shared::models::{
    AttendanceRecord, ItemStatus, Order, OrderItem, OrderStatus, Payment, Plan, Table,
    TableStatus,
};
use thiserror::Error;

/// Why the engine refused an action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    /// Action is illegal for the current state
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Payload violates a numeric/edge policy
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("user already has an open attendance record")]
    AlreadyClockedIn,

    #[error("user has no open attendance record")]
    NotClockedIn,
}

/// Current state of one table and its open order, read under the
/// table's critical section
#[derive(Debug, Clone)]
pub struct TableOrderState {
    pub table: Table,
    /// The Active/AwaitingPayment order occupying the table, if any
    pub order: Option<Order>,
}

/// Fully-specified open-table command (ids and clock pre-generated)
#[derive(Debug, Clone)]
pub struct OpenTableCmd {
    pub order_id: i64,
    pub order_token: String,
    pub customer_quantity: u32,
    pub plan: Plan,
    pub service_type: String,
    pub timestamp: i64,
}

/// Requested table/order action
#[derive(Debug, Clone)]
pub enum TableAction {
    Open(OpenTableCmd),
    RequestBill,
    RecordPayment {
        payment_id: i64,
        method: String,
        total: i64,
        timestamp: i64,
    },
    Cancel {
        timestamp: i64,
    },
}

/// What to commit when a table/order action is legal
#[derive(Debug, Clone)]
pub enum TableTransition {
    Opened { table: Table, order: Order },
    BillRequested { order: Order },
    PaymentTaken {
        table: Table,
        order: Order,
        payment: Payment,
    },
    Cancelled { table: Table, order: Order },
}

/// Decide a table/order action against the current state.
///
/// Combined machine: table occupancy and order status change together,
/// so one decision covers both rows.
pub fn decide_table(
    state: &TableOrderState,
    action: TableAction,
) -> Result<TableTransition, Rejection> {
    match action {
        TableAction::Open(cmd) => decide_open(state, cmd),
        TableAction::RequestBill => {
            let order = open_order(state)?;
            if order.status != OrderStatus::Active {
                return Err(Rejection::InvalidTransition(format!(
                    "order {} is {:?}, bill already requested or order closed",
                    order.order_id, order.status
                )));
            }
            let mut order = order.clone();
            order.status = OrderStatus::AwaitingPayment;
            Ok(TableTransition::BillRequested { order })
        }
        TableAction::RecordPayment {
            payment_id,
            method,
            total,
            timestamp,
        } => {
            let order = open_order(state)?;
            let mut order = order.clone();
            order.status = OrderStatus::Closed;
            order.closed_time = Some(timestamp);
            let mut table = state.table.clone();
            table.status = TableStatus::Free;
            let payment = Payment {
                payment_id,
                order_id: order.order_id,
                method,
                total,
                recorded_at: timestamp,
            };
            Ok(TableTransition::PaymentTaken {
                table,
                order,
                payment,
            })
        }
        TableAction::Cancel { timestamp } => {
            let order = open_order(state)?;
            let mut order = order.clone();
            order.status = OrderStatus::Cancelled;
            order.closed_time = Some(timestamp);
            let mut table = state.table.clone();
            table.status = TableStatus::Free;
            Ok(TableTransition::Cancelled { table, order })
        }
    }
}

fn decide_open(state: &TableOrderState, cmd: OpenTableCmd) -> Result<TableTransition, Rejection> {
    if !state.table.is_free() || state.order.is_some() {
        return Err(Rejection::InvalidTransition(format!(
            "table {} is not free",
            state.table.table_id
        )));
    }
    if cmd.customer_quantity == 0 {
        return Err(Rejection::Validation(
            "customer quantity must be positive".to_string(),
        ));
    }
    if cmd.customer_quantity > state.table.seat_capacity {
        return Err(Rejection::Validation(format!(
            "customer quantity {} exceeds seat capacity {}",
            cmd.customer_quantity, state.table.seat_capacity
        )));
    }

    // Snapshot pricing: what is charged is fixed now, regardless of
    // later plan edits.
    let charged_total = cmd.plan.price_per_person * i64::from(cmd.customer_quantity);

    let mut table = state.table.clone();
    table.status = TableStatus::Occupied;
    let order = Order {
        order_id: cmd.order_id,
        order_token: cmd.order_token,
        table_id: state.table.table_id,
        service_type: cmd.service_type,
        customer_quantity: cmd.customer_quantity,
        plan_id: cmd.plan.plan_id,
        plan_price_per_person: cmd.plan.price_per_person,
        charged_total,
        start_time: cmd.timestamp,
        status: OrderStatus::Active,
        closed_time: None,
    };
    Ok(TableTransition::Opened { table, order })
}

/// The open order, or the rejection every mutation of a settled table
/// shares
fn open_order(state: &TableOrderState) -> Result<&Order, Rejection> {
    match &state.order {
        Some(order) if order.is_open() => Ok(order),
        Some(order) => Err(Rejection::InvalidTransition(format!(
            "order {} is {:?} and immutable",
            order.order_id, order.status
        ))),
        None => Err(Rejection::InvalidTransition(format!(
            "table {} has no open order",
            state.table.table_id
        ))),
    }
}

/// Adding an item is legal only while the owning order is Active.
///
/// This is also what settles the AddItem/Cancel race: both run under
/// the same table-scoped critical section, so whichever commits first
/// decides what the other sees.
pub fn decide_add_item(order: &Order) -> Result<(), Rejection> {
    if order.status != OrderStatus::Active {
        return Err(Rejection::InvalidTransition(format!(
            "order {} is {:?}, items can only be added while active",
            order.order_id, order.status
        )));
    }
    Ok(())
}

/// Outcome of a deliver request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverDecision {
    Deliver,
    /// Duplicate click: success with no state change and no event
    AlreadyDelivered,
}

/// Pending → Delivered, exactly once, never reversed
pub fn decide_deliver(item: &OrderItem) -> DeliverDecision {
    match item.status {
        ItemStatus::Pending => DeliverDecision::Deliver,
        ItemStatus::Delivered => DeliverDecision::AlreadyDelivered,
    }
}

/// Requested attendance action (ids and clock pre-generated)
#[derive(Debug, Clone)]
pub enum AttendanceAction {
    ClockIn { attendance_id: i64, timestamp: i64 },
    ClockOut { timestamp: i64 },
}

/// What to commit when an attendance action is legal
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceTransition {
    ClockedIn(AttendanceRecord),
    ClockedOut(AttendanceRecord),
}

/// ClockedOut --ClockIn--> ClockedIn --ClockOut--> ClockedOut
pub fn decide_attendance(
    user_id: i64,
    open: Option<&AttendanceRecord>,
    action: AttendanceAction,
) -> Result<AttendanceTransition, Rejection> {
    match action {
        AttendanceAction::ClockIn {
            attendance_id,
            timestamp,
        } => {
            if open.is_some() {
                return Err(Rejection::AlreadyClockedIn);
            }
            Ok(AttendanceTransition::ClockedIn(AttendanceRecord {
                attendance_id,
                user_id,
                clock_in_time: timestamp,
                clock_out_time: None,
            }))
        }
        AttendanceAction::ClockOut { timestamp } => {
            let Some(record) = open else {
                return Err(Rejection::NotClockedIn);
            };
            let mut record = record.clone();
            record.clock_out_time = Some(timestamp);
            Ok(AttendanceTransition::ClockedOut(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_table() -> Table {
        Table {
            table_id: 5,
            number: 5,
            seat_capacity: 4,
            status: TableStatus::Free,
        }
    }

    fn premium_plan() -> Plan {
        Plan {
            plan_id: 2,
            name: "Premium".to_string(),
            price_per_person: 299,
        }
    }

    fn open_cmd(quantity: u32) -> OpenTableCmd {
        OpenTableCmd {
            order_id: 100,
            order_token: "tok".to_string(),
            customer_quantity: quantity,
            plan: premium_plan(),
            service_type: "ชาบู".to_string(),
            timestamp: 1000,
        }
    }

    fn occupied_state(status: OrderStatus) -> TableOrderState {
        let mut table = free_table();
        table.status = TableStatus::Occupied;
        TableOrderState {
            table,
            order: Some(Order {
                order_id: 100,
                order_token: "tok".to_string(),
                table_id: 5,
                service_type: "ชาบู".to_string(),
                customer_quantity: 4,
                plan_id: 2,
                plan_price_per_person: 299,
                charged_total: 1196,
                start_time: 1000,
                status,
                closed_time: None,
            }),
        }
    }

    #[test]
    fn open_free_table_snapshots_price() {
        let state = TableOrderState {
            table: free_table(),
            order: None,
        };
        let transition = decide_table(&state, TableAction::Open(open_cmd(4))).unwrap();
        match transition {
            TableTransition::Opened { table, order } => {
                assert_eq!(table.status, TableStatus::Occupied);
                assert_eq!(order.status, OrderStatus::Active);
                assert_eq!(order.charged_total, 1196);
                assert_eq!(order.plan_price_per_person, 299);
            }
            other => panic!("expected Opened, got {other:?}"),
        }
    }

    #[test]
    fn open_rejects_over_capacity_and_zero() {
        let state = TableOrderState {
            table: free_table(),
            order: None,
        };
        assert!(matches!(
            decide_table(&state, TableAction::Open(open_cmd(5))),
            Err(Rejection::Validation(_))
        ));
        assert!(matches!(
            decide_table(&state, TableAction::Open(open_cmd(0))),
            Err(Rejection::Validation(_))
        ));
    }

    #[test]
    fn open_rejects_occupied_table() {
        let state = occupied_state(OrderStatus::Active);
        assert!(matches!(
            decide_table(&state, TableAction::Open(open_cmd(2))),
            Err(Rejection::InvalidTransition(_))
        ));
    }

    #[test]
    fn bill_only_from_active() {
        let transition =
            decide_table(&occupied_state(OrderStatus::Active), TableAction::RequestBill).unwrap();
        match transition {
            TableTransition::BillRequested { order } => {
                assert_eq!(order.status, OrderStatus::AwaitingPayment);
            }
            other => panic!("expected BillRequested, got {other:?}"),
        }

        assert!(matches!(
            decide_table(
                &occupied_state(OrderStatus::AwaitingPayment),
                TableAction::RequestBill
            ),
            Err(Rejection::InvalidTransition(_))
        ));
    }

    #[test]
    fn payment_closes_order_and_frees_table() {
        for status in [OrderStatus::Active, OrderStatus::AwaitingPayment] {
            let transition = decide_table(
                &occupied_state(status),
                TableAction::RecordPayment {
                    payment_id: 77,
                    method: "cash".to_string(),
                    total: 1196,
                    timestamp: 2000,
                },
            )
            .unwrap();
            match transition {
                TableTransition::PaymentTaken {
                    table,
                    order,
                    payment,
                } => {
                    assert_eq!(table.status, TableStatus::Free);
                    assert_eq!(order.status, OrderStatus::Closed);
                    assert_eq!(order.closed_time, Some(2000));
                    assert_eq!(payment.order_id, 100);
                    assert_eq!(payment.total, 1196);
                }
                other => panic!("expected PaymentTaken, got {other:?}"),
            }
        }
    }

    #[test]
    fn settled_orders_are_immutable() {
        for status in [OrderStatus::Closed, OrderStatus::Cancelled] {
            let state = occupied_state(status);
            for action in [
                TableAction::RequestBill,
                TableAction::RecordPayment {
                    payment_id: 1,
                    method: "cash".to_string(),
                    total: 1,
                    timestamp: 1,
                },
                TableAction::Cancel { timestamp: 1 },
            ] {
                assert!(matches!(
                    decide_table(&state, action),
                    Err(Rejection::InvalidTransition(_))
                ));
            }
        }
    }

    #[test]
    fn cancel_frees_table() {
        let transition = decide_table(
            &occupied_state(OrderStatus::AwaitingPayment),
            TableAction::Cancel { timestamp: 3000 },
        )
        .unwrap();
        match transition {
            TableTransition::Cancelled { table, order } => {
                assert_eq!(table.status, TableStatus::Free);
                assert_eq!(order.status, OrderStatus::Cancelled);
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn add_item_requires_active_order() {
        let active = occupied_state(OrderStatus::Active).order.unwrap();
        assert!(decide_add_item(&active).is_ok());

        for status in [
            OrderStatus::AwaitingPayment,
            OrderStatus::Closed,
            OrderStatus::Cancelled,
        ] {
            let order = occupied_state(status).order.unwrap();
            assert!(matches!(
                decide_add_item(&order),
                Err(Rejection::InvalidTransition(_))
            ));
        }
    }

    #[test]
    fn deliver_is_idempotent() {
        let mut item = OrderItem {
            order_detail_id: 1,
            order_id: 100,
            menu_id: 7,
            quantity: 2,
            status: ItemStatus::Pending,
            created_at: 0,
            delivered_at: None,
        };
        assert_eq!(decide_deliver(&item), DeliverDecision::Deliver);
        item.status = ItemStatus::Delivered;
        assert_eq!(decide_deliver(&item), DeliverDecision::AlreadyDelivered);
    }

    #[test]
    fn attendance_round_trip() {
        let clocked_in = decide_attendance(
            3,
            None,
            AttendanceAction::ClockIn {
                attendance_id: 900,
                timestamp: 10,
            },
        )
        .unwrap();
        let record = match clocked_in {
            AttendanceTransition::ClockedIn(record) => record,
            other => panic!("expected ClockedIn, got {other:?}"),
        };
        assert!(record.is_open());

        // Second clock-in while open is rejected
        assert_eq!(
            decide_attendance(
                3,
                Some(&record),
                AttendanceAction::ClockIn {
                    attendance_id: 901,
                    timestamp: 20,
                },
            ),
            Err(Rejection::AlreadyClockedIn)
        );

        let clocked_out =
            decide_attendance(3, Some(&record), AttendanceAction::ClockOut { timestamp: 30 })
                .unwrap();
        match clocked_out {
            AttendanceTransition::ClockedOut(record) => {
                assert_eq!(record.clock_out_time, Some(30));
            }
            other => panic!("expected ClockedOut, got {other:?}"),
        }

        // Clock-out without an open span is rejected
        assert_eq!(
            decide_attendance(3, None, AttendanceAction::ClockOut { timestamp: 40 }),
            Err(Rejection::NotClockedIn)
        );
    }
}
