//! Mutation gateway - the only path that commits a state transition
//!
//! # Mutation flow
//!
//! ```text
//! mutate(key, payload)
//!     ├─ 1. Validate payload (no lock held)
//!     ├─ 2. Acquire per-resource critical section (bounded wait → Busy)
//!     ├─ 3. Read current state from the store
//!     ├─ 4. Ask the lifecycle engine for a decision
//!     ├─ 5. Commit the transition in one store transaction
//!     ├─ 6. Publish exactly one domain event to the hub
//!     └─ 7. Release the section, return to the caller
//! ```
//!
//! Rejections and commit failures publish nothing: there is never a
//! partially visible state change. The event is published before the
//! critical section is released, which is what gives every broadcast
//! channel the commit order of its resource.

mod error;
mod locks;

pub use error::{GatewayError, GatewayResult};
pub use locks::{ResourceKey, ResourceLocks};

use crate::hub::BroadcastHub;
use crate::lifecycle::{
    self, AttendanceAction, AttendanceTransition, DeliverDecision, OpenTableCmd, TableAction,
    TableOrderState, TableTransition,
};
use crate::store::{StateStore, StockTake};
use serde::Serialize;
use shared::event::{DomainEvent, EventPayload};
use shared::models::{AttendanceRecord, ItemStatus, Order, OrderItem, StockLevel, Table};
use shared::request::{AddItemRequest, OpenTableRequest, PaymentRequest};
use shared::util::{now_millis, order_token, snowflake_id};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Result of opening a table
#[derive(Debug, Clone, Serialize)]
pub struct OpenedOrder {
    pub order_id: i64,
    /// Goes on the customer QR slip
    pub order_token: String,
}

/// Result of recording a payment
#[derive(Debug, Clone, Serialize)]
pub struct RecordedPayment {
    pub payment_id: i64,
}

/// Result of adding a line item
#[derive(Debug, Clone, Serialize)]
pub struct AddedItem {
    pub order_detail_id: i64,
}

/// Mutation gateway over the floor state
pub struct MutationGateway {
    store: StateStore,
    hub: Arc<BroadcastHub>,
    locks: ResourceLocks,
}

impl MutationGateway {
    pub fn new(store: StateStore, hub: Arc<BroadcastHub>, lock_wait: Duration) -> Self {
        Self {
            store,
            hub,
            locks: ResourceLocks::new(lock_wait),
        }
    }

    // ========== Table / Order Mutations ==========

    /// Open a free table and start its order
    pub async fn open_table(
        &self,
        table_id: i64,
        req: OpenTableRequest,
    ) -> GatewayResult<OpenedOrder> {
        validate(&req)?;
        let plan = self
            .store
            .get_plan(req.plan_id)?
            .ok_or(GatewayError::PlanNotFound(req.plan_id))?;

        let _guard = self.locks.acquire(ResourceKey::Table(table_id)).await?;

        let state = self.table_state(table_id)?;
        let cmd = OpenTableCmd {
            order_id: snowflake_id(),
            order_token: order_token(),
            customer_quantity: req.customer_quantity,
            plan,
            service_type: req.service_type,
            timestamp: now_millis(),
        };
        let transition = lifecycle::decide_table(&state, TableAction::Open(cmd))?;
        let TableTransition::Opened { table, order } = transition else {
            unreachable!("Open decides Opened");
        };

        let txn = self.store.begin_write()?;
        self.store.put_table(&txn, &table)?;
        self.store.put_order(&txn, &order)?;
        self.store.register_token(&txn, &order.order_token, order.order_id)?;
        self.store.link_active_order(&txn, table_id, order.order_id)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(
            table_id,
            order_id = order.order_id,
            customer_quantity = order.customer_quantity,
            charged_total = order.charged_total,
            "Table opened"
        );
        let opened = OpenedOrder {
            order_id: order.order_id,
            order_token: order.order_token.clone(),
        };
        self.publish(EventPayload::TableStateChanged { table, order });
        Ok(opened)
    }

    /// Move an active order to AwaitingPayment ("call for bill")
    pub async fn request_bill(&self, order_id: i64) -> GatewayResult<()> {
        let table_id = self.owning_table(order_id)?;
        let _guard = self.locks.acquire(ResourceKey::Table(table_id)).await?;

        let state = self.table_state(table_id)?;
        require_same_order(&state, order_id)?;
        let transition = lifecycle::decide_table(&state, TableAction::RequestBill)?;
        let TableTransition::BillRequested { order } = transition else {
            unreachable!("RequestBill decides BillRequested");
        };

        let txn = self.store.begin_write()?;
        self.store.put_order(&txn, &order)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(order_id, table_id, "Bill requested");
        self.publish(EventPayload::TableStateChanged {
            table: state.table,
            order,
        });
        Ok(())
    }

    /// Record the payment that closes an order and frees its table
    pub async fn record_payment(
        &self,
        order_id: i64,
        req: PaymentRequest,
    ) -> GatewayResult<RecordedPayment> {
        validate(&req)?;
        let table_id = self.owning_table(order_id)?;
        let _guard = self.locks.acquire(ResourceKey::Table(table_id)).await?;

        let state = self.table_state(table_id)?;
        require_same_order(&state, order_id)?;
        let transition = lifecycle::decide_table(
            &state,
            TableAction::RecordPayment {
                payment_id: snowflake_id(),
                method: req.method,
                total: req.total,
                timestamp: now_millis(),
            },
        )?;
        let TableTransition::PaymentTaken {
            table,
            order,
            payment,
        } = transition
        else {
            unreachable!("RecordPayment decides PaymentTaken");
        };

        let txn = self.store.begin_write()?;
        self.store.put_table(&txn, &table)?;
        self.store.put_order(&txn, &order)?;
        self.store.put_payment(&txn, &payment)?;
        self.store.unlink_active_order(&txn, table_id)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(
            order_id,
            table_id,
            payment_id = payment.payment_id,
            method = %payment.method,
            total = payment.total,
            "Payment recorded, table freed"
        );
        let recorded = RecordedPayment {
            payment_id: payment.payment_id,
        };
        self.publish(EventPayload::PaymentRecorded {
            payment,
            table,
            order,
        });
        Ok(recorded)
    }

    /// Staff override: cancel an open order and free its table
    pub async fn cancel_order(&self, order_id: i64) -> GatewayResult<()> {
        let table_id = self.owning_table(order_id)?;
        let _guard = self.locks.acquire(ResourceKey::Table(table_id)).await?;

        let state = self.table_state(table_id)?;
        require_same_order(&state, order_id)?;
        let transition = lifecycle::decide_table(
            &state,
            TableAction::Cancel {
                timestamp: now_millis(),
            },
        )?;
        let TableTransition::Cancelled { table, order } = transition else {
            unreachable!("Cancel decides Cancelled");
        };

        let txn = self.store.begin_write()?;
        self.store.put_table(&txn, &table)?;
        self.store.put_order(&txn, &order)?;
        self.store.unlink_active_order(&txn, table_id)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(order_id, table_id, "Order cancelled, table freed");
        self.publish(EventPayload::TableStateChanged { table, order });
        Ok(())
    }

    // ========== Line Items ==========

    /// Add a line item to an active order (customer or staff device)
    pub async fn add_item(&self, order_id: i64, req: AddItemRequest) -> GatewayResult<AddedItem> {
        validate(&req)?;
        let table_id = self.owning_table(order_id)?;
        let _guard = self.locks.acquire(ResourceKey::Table(table_id)).await?;

        let state = self.table_state(table_id)?;
        require_same_order(&state, order_id)?;
        let order = state
            .order
            .as_ref()
            .ok_or(GatewayError::OrderNotFound(order_id))?;
        lifecycle::decide_add_item(order)?;

        let item = OrderItem {
            order_detail_id: snowflake_id(),
            order_id,
            menu_id: req.menu_id,
            quantity: req.quantity,
            status: ItemStatus::Pending,
            created_at: now_millis(),
            delivered_at: None,
        };

        let txn = self.store.begin_write()?;
        match self
            .store
            .take_stock(&txn, req.menu_id, i64::from(req.quantity))?
        {
            StockTake::Insufficient(remaining) => {
                txn.abort().map_err(crate::store::StorageError::from)?;
                return Err(GatewayError::OutOfStock {
                    menu_id: req.menu_id,
                    requested: i64::from(req.quantity),
                    remaining,
                });
            }
            StockTake::Untracked | StockTake::Taken(_) => {}
        }
        self.store.put_order_item(&txn, &item)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(
            order_id,
            order_detail_id = item.order_detail_id,
            menu_id = item.menu_id,
            quantity = item.quantity,
            "Item added"
        );
        let added = AddedItem {
            order_detail_id: item.order_detail_id,
        };
        self.publish(EventPayload::OrderItemAdded {
            order_id,
            table_id,
            table_number: state.table.number,
            item,
        });
        Ok(added)
    }

    /// Mark a line item delivered. Idempotent: delivering a delivered
    /// item succeeds without a second event (kitchen double-taps).
    pub async fn deliver_item(&self, order_detail_id: i64) -> GatewayResult<()> {
        let preread = self
            .store
            .get_order_item(order_detail_id)?
            .ok_or(GatewayError::ItemNotFound(order_detail_id))?;
        let order = self
            .store
            .get_order(preread.order_id)?
            .ok_or(GatewayError::OrderNotFound(preread.order_id))?;
        let table_id = order.table_id;

        let _guard = self.locks.acquire(ResourceKey::Table(table_id)).await?;

        // Re-read under the lock: a concurrent deliver may have won
        let mut item = self
            .store
            .get_order_item(order_detail_id)?
            .ok_or(GatewayError::ItemNotFound(order_detail_id))?;
        match lifecycle::decide_deliver(&item) {
            DeliverDecision::AlreadyDelivered => {
                tracing::debug!(order_detail_id, "Duplicate deliver, no-op");
                return Ok(());
            }
            DeliverDecision::Deliver => {}
        }

        item.status = ItemStatus::Delivered;
        item.delivered_at = Some(now_millis());

        let txn = self.store.begin_write()?;
        self.store.put_order_item(&txn, &item)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(order_detail_id, order_id = item.order_id, "Item delivered");
        self.publish(EventPayload::OrderItemDelivered {
            order_id: item.order_id,
            table_id,
            item,
        });
        Ok(())
    }

    // ========== Attendance ==========

    pub async fn clock_in(&self, user_id: i64) -> GatewayResult<()> {
        let _guard = self.locks.acquire(ResourceKey::User(user_id)).await?;

        let open = self.store.open_attendance_for_user(user_id)?;
        let transition = lifecycle::decide_attendance(
            user_id,
            open.as_ref(),
            AttendanceAction::ClockIn {
                attendance_id: snowflake_id(),
                timestamp: now_millis(),
            },
        )?;
        let AttendanceTransition::ClockedIn(record) = transition else {
            unreachable!("ClockIn decides ClockedIn");
        };

        let txn = self.store.begin_write()?;
        self.store.put_attendance(&txn, &record)?;
        self.store
            .set_open_attendance(&txn, user_id, record.attendance_id)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(user_id, attendance_id = record.attendance_id, "Clocked in");
        self.publish(EventPayload::AttendanceChanged {
            user_id,
            record,
            clocked_in: true,
        });
        Ok(())
    }

    pub async fn clock_out(&self, user_id: i64) -> GatewayResult<()> {
        let _guard = self.locks.acquire(ResourceKey::User(user_id)).await?;

        let open = self.store.open_attendance_for_user(user_id)?;
        let transition = lifecycle::decide_attendance(
            user_id,
            open.as_ref(),
            AttendanceAction::ClockOut {
                timestamp: now_millis(),
            },
        )?;
        let AttendanceTransition::ClockedOut(record) = transition else {
            unreachable!("ClockOut decides ClockedOut");
        };

        let txn = self.store.begin_write()?;
        self.store.put_attendance(&txn, &record)?;
        self.store.clear_open_attendance(&txn, user_id)?;
        txn.commit().map_err(crate::store::StorageError::from)?;

        tracing::info!(user_id, attendance_id = record.attendance_id, "Clocked out");
        self.publish(EventPayload::AttendanceChanged {
            user_id,
            record,
            clocked_in: false,
        });
        Ok(())
    }

    // ========== Public Query Methods ==========
    //
    // Read side for (re)connecting clients: events are hints, these
    // are the truth.

    pub fn get_table(&self, table_id: i64) -> GatewayResult<Option<Table>> {
        Ok(self.store.get_table(table_id)?)
    }

    pub fn list_tables(&self) -> GatewayResult<Vec<Table>> {
        Ok(self.store.list_tables()?)
    }

    pub fn get_order(&self, order_id: i64) -> GatewayResult<Option<Order>> {
        Ok(self.store.get_order(order_id)?)
    }

    pub fn find_order_by_token(&self, token: &str) -> GatewayResult<Option<Order>> {
        Ok(self.store.find_order_by_token(token)?)
    }

    pub fn list_active_orders(&self) -> GatewayResult<Vec<Order>> {
        Ok(self.store.list_active_orders()?)
    }

    pub fn list_items_for_order(&self, order_id: i64) -> GatewayResult<Vec<OrderItem>> {
        Ok(self.store.list_items_for_order(order_id)?)
    }

    /// Kitchen bootstrap: undelivered items across all open orders
    pub fn list_pending_items(&self) -> GatewayResult<Vec<OrderItem>> {
        Ok(self.store.list_pending_items()?)
    }

    /// The user's open attendance span, if clocked in
    pub fn attendance_status(&self, user_id: i64) -> GatewayResult<Option<AttendanceRecord>> {
        Ok(self.store.open_attendance_for_user(user_id)?)
    }

    pub fn stock_remaining(&self, menu_id: i64) -> GatewayResult<Option<StockLevel>> {
        Ok(self.store.stock_remaining(menu_id)?)
    }

    // ========== Internals ==========

    /// Resolve an order to the table whose critical section guards it.
    ///
    /// Read outside the lock: an order never changes tables, so the
    /// mapping is stable even if the order settles concurrently.
    fn owning_table(&self, order_id: i64) -> GatewayResult<i64> {
        let order = self
            .store
            .get_order(order_id)?
            .ok_or(GatewayError::OrderNotFound(order_id))?;
        Ok(order.table_id)
    }

    /// Read the table and its open order under the critical section
    fn table_state(&self, table_id: i64) -> GatewayResult<TableOrderState> {
        let table = self
            .store
            .get_table(table_id)?
            .ok_or(GatewayError::TableNotFound(table_id))?;
        let order = match self.store.active_order_for_table(table_id)? {
            Some(order_id) => self.store.get_order(order_id)?,
            None => None,
        };
        Ok(TableOrderState { table, order })
    }

    fn publish(&self, payload: EventPayload) {
        let event = DomainEvent::new(payload);
        tracing::debug!(event = event.name(), event_id = %event.event_id, "Publishing event");
        self.hub.publish(&Arc::new(event));
    }
}

/// An order-addressed action must hit the order that still occupies
/// the table; a settled order falls through to the engine's
/// InvalidTransition with its terminal status in the message.
fn require_same_order(state: &TableOrderState, order_id: i64) -> GatewayResult<()> {
    match &state.order {
        Some(order) if order.order_id == order_id => Ok(()),
        _ => Err(GatewayError::InvalidTransition(format!(
            "order {order_id} is no longer open on table {}",
            state.table.table_id
        ))),
    }
}

fn validate(req: &impl Validate) -> GatewayResult<()> {
    req.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))
}
