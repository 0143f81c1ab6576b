//! redb-based state store for the floor coordinator
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `tables` | `table_id` | `Table` | Dining tables (seeded at setup) |
//! | `plans` | `plan_id` | `Plan` | Buffet plans (seeded at setup) |
//! | `orders` | `order_id` | `Order` | All orders, open and historical |
//! | `order_items` | `(order_id, order_detail_id)` | `OrderItem` | Line items |
//! | `item_index` | `order_detail_id` | `order_id` | Item → order lookup |
//! | `order_tokens` | `token` | `order_id` | Customer URL token lookup |
//! | `active_orders` | `table_id` | `order_id` | Open order per table |
//! | `payments` | `payment_id` | `Payment` | Recorded payments |
//! | `attendance` | `attendance_id` | `AttendanceRecord` | Clock spans |
//! | `open_attendance` | `user_id` | `attendance_id` | Open span per user |
//! | `stock_ledger` | `menu_id` | `remaining: i64` | Counted dishes |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: copy-on-write with an
//! atomic pointer swap, so the database file stays consistent through
//! power loss on the till hardware. A commit that returns is durable.
//!
//! The store is the single source of truth. Everything the broadcast
//! hub fans out is derived from committed rows here; a client that
//! distrusts its event stream re-reads these tables.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::models::{AttendanceRecord, Order, OrderItem, Payment, Plan, StockLevel, Table};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Dining tables: key = table_id, value = JSON-serialized Table
const TABLES_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("tables");

/// Buffet plans: key = plan_id, value = JSON-serialized Plan
const PLANS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("plans");

/// Orders: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("orders");

/// Line items: key = (order_id, order_detail_id), value = JSON-serialized OrderItem
const ORDER_ITEMS_TABLE: TableDefinition<(i64, i64), &[u8]> =
    TableDefinition::new("order_items");

/// Item → order index: key = order_detail_id, value = order_id
const ITEM_INDEX_TABLE: TableDefinition<i64, i64> = TableDefinition::new("item_index");

/// Token lookup: key = order_token, value = order_id
const ORDER_TOKENS_TABLE: TableDefinition<&str, i64> = TableDefinition::new("order_tokens");

/// Open order per table: key = table_id, value = order_id (existence = occupied)
const ACTIVE_ORDERS_TABLE: TableDefinition<i64, i64> = TableDefinition::new("active_orders");

/// Payments: key = payment_id, value = JSON-serialized Payment
const PAYMENTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("payments");

/// Attendance spans: key = attendance_id, value = JSON-serialized AttendanceRecord
const ATTENDANCE_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("attendance");

/// Open span per user: key = user_id, value = attendance_id
const OPEN_ATTENDANCE_TABLE: TableDefinition<i64, i64> =
    TableDefinition::new("open_attendance");

/// Counted dish stock: key = menu_id, value = remaining quantity
const STOCK_TABLE: TableDefinition<i64, i64> = TableDefinition::new("stock_ledger");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a stock take inside a write transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockTake {
    /// No ledger row for this menu entry - stock is not counted
    Untracked,
    /// Decremented; remaining quantity after the take
    Taken(i64),
    /// Ledger has fewer than requested; nothing was changed
    Insufficient(i64),
}

/// Floor state backed by redb
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Open an in-memory database (tests, demos)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Create all tables so later read transactions never miss one
    fn init_tables(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(TABLES_TABLE)?;
            let _ = write_txn.open_table(PLANS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_ITEMS_TABLE)?;
            let _ = write_txn.open_table(ITEM_INDEX_TABLE)?;
            let _ = write_txn.open_table(ORDER_TOKENS_TABLE)?;
            let _ = write_txn.open_table(ACTIVE_ORDERS_TABLE)?;
            let _ = write_txn.open_table(PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(ATTENDANCE_TABLE)?;
            let _ = write_txn.open_table(OPEN_ATTENDANCE_TABLE)?;
            let _ = write_txn.open_table(STOCK_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Setup Seeding ==========

    /// Seed dining tables from shop configuration
    pub fn seed_tables(&self, tables: &[Table]) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut t = txn.open_table(TABLES_TABLE)?;
            for table in tables {
                let value = serde_json::to_vec(table)?;
                t.insert(table.table_id, value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Seed buffet plans from shop configuration
    pub fn seed_plans(&self, plans: &[Plan]) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut t = txn.open_table(PLANS_TABLE)?;
            for plan in plans {
                let value = serde_json::to_vec(plan)?;
                t.insert(plan.plan_id, value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Set the counted stock for a menu entry
    pub fn set_stock(&self, menu_id: i64, remaining: i64) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut t = txn.open_table(STOCK_TABLE)?;
            t.insert(menu_id, remaining)?;
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Transactional Writes ==========

    pub fn put_table(&self, txn: &WriteTransaction, table: &Table) -> StorageResult<()> {
        let mut t = txn.open_table(TABLES_TABLE)?;
        let value = serde_json::to_vec(table)?;
        t.insert(table.table_id, value.as_slice())?;
        Ok(())
    }

    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let mut t = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        t.insert(order.order_id, value.as_slice())?;
        Ok(())
    }

    pub fn put_order_item(&self, txn: &WriteTransaction, item: &OrderItem) -> StorageResult<()> {
        {
            let mut t = txn.open_table(ORDER_ITEMS_TABLE)?;
            let value = serde_json::to_vec(item)?;
            t.insert((item.order_id, item.order_detail_id), value.as_slice())?;
        }
        let mut index = txn.open_table(ITEM_INDEX_TABLE)?;
        index.insert(item.order_detail_id, item.order_id)?;
        Ok(())
    }

    pub fn put_payment(&self, txn: &WriteTransaction, payment: &Payment) -> StorageResult<()> {
        let mut t = txn.open_table(PAYMENTS_TABLE)?;
        let value = serde_json::to_vec(payment)?;
        t.insert(payment.payment_id, value.as_slice())?;
        Ok(())
    }

    pub fn put_attendance(
        &self,
        txn: &WriteTransaction,
        record: &AttendanceRecord,
    ) -> StorageResult<()> {
        let mut t = txn.open_table(ATTENDANCE_TABLE)?;
        let value = serde_json::to_vec(record)?;
        t.insert(record.attendance_id, value.as_slice())?;
        Ok(())
    }

    /// Register the customer URL token for a new order
    pub fn register_token(
        &self,
        txn: &WriteTransaction,
        token: &str,
        order_id: i64,
    ) -> StorageResult<()> {
        let mut t = txn.open_table(ORDER_TOKENS_TABLE)?;
        t.insert(token, order_id)?;
        Ok(())
    }

    /// Mark a table as holding the given open order
    pub fn link_active_order(
        &self,
        txn: &WriteTransaction,
        table_id: i64,
        order_id: i64,
    ) -> StorageResult<()> {
        let mut t = txn.open_table(ACTIVE_ORDERS_TABLE)?;
        t.insert(table_id, order_id)?;
        Ok(())
    }

    /// Clear a table's open-order marker (close, cancel)
    pub fn unlink_active_order(&self, txn: &WriteTransaction, table_id: i64) -> StorageResult<()> {
        let mut t = txn.open_table(ACTIVE_ORDERS_TABLE)?;
        t.remove(table_id)?;
        Ok(())
    }

    pub fn set_open_attendance(
        &self,
        txn: &WriteTransaction,
        user_id: i64,
        attendance_id: i64,
    ) -> StorageResult<()> {
        let mut t = txn.open_table(OPEN_ATTENDANCE_TABLE)?;
        t.insert(user_id, attendance_id)?;
        Ok(())
    }

    pub fn clear_open_attendance(
        &self,
        txn: &WriteTransaction,
        user_id: i64,
    ) -> StorageResult<()> {
        let mut t = txn.open_table(OPEN_ATTENDANCE_TABLE)?;
        t.remove(user_id)?;
        Ok(())
    }

    /// Take `quantity` from the stock ledger inside the transaction.
    ///
    /// Returns [`StockTake::Insufficient`] without changing the ledger
    /// when remaining < quantity; the caller aborts the transaction.
    pub fn take_stock(
        &self,
        txn: &WriteTransaction,
        menu_id: i64,
        quantity: i64,
    ) -> StorageResult<StockTake> {
        let mut t = txn.open_table(STOCK_TABLE)?;
        let remaining = match t.get(menu_id)? {
            Some(guard) => guard.value(),
            None => return Ok(StockTake::Untracked),
        };
        if remaining < quantity {
            return Ok(StockTake::Insufficient(remaining));
        }
        let left = remaining - quantity;
        t.insert(menu_id, left)?;
        Ok(StockTake::Taken(left))
    }

    // ========== Reads ==========

    pub fn get_table(&self, table_id: i64) -> StorageResult<Option<Table>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(TABLES_TABLE)?;
        match t.get(table_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_tables(&self) -> StorageResult<Vec<Table>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(TABLES_TABLE)?;
        let mut tables = Vec::new();
        for result in t.iter()? {
            let (_key, value) = result?;
            tables.push(serde_json::from_slice(value.value())?);
        }
        Ok(tables)
    }

    pub fn get_plan(&self, plan_id: i64) -> StorageResult<Option<Plan>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(PLANS_TABLE)?;
        match t.get(plan_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_order(&self, order_id: i64) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(ORDERS_TABLE)?;
        match t.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a customer URL token to its order
    pub fn find_order_by_token(&self, token: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let tokens = read_txn.open_table(ORDER_TOKENS_TABLE)?;
        let order_id = match tokens.get(token)? {
            Some(guard) => guard.value(),
            None => return Ok(None),
        };
        let orders = read_txn.open_table(ORDERS_TABLE)?;
        match orders.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// The open order currently occupying a table, if any
    pub fn active_order_for_table(&self, table_id: i64) -> StorageResult<Option<i64>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(ACTIVE_ORDERS_TABLE)?;
        Ok(t.get(table_id)?.map(|guard| guard.value()))
    }

    /// All open orders (dashboard bootstrap on connect)
    pub fn list_active_orders(&self) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let active = read_txn.open_table(ACTIVE_ORDERS_TABLE)?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;
        let mut result = Vec::new();
        for entry in active.iter()? {
            let (_table_id, order_id) = entry?;
            if let Some(guard) = orders.get(order_id.value())? {
                result.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(result)
    }

    pub fn get_order_item(&self, order_detail_id: i64) -> StorageResult<Option<OrderItem>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ITEM_INDEX_TABLE)?;
        let order_id = match index.get(order_detail_id)? {
            Some(guard) => guard.value(),
            None => return Ok(None),
        };
        let items = read_txn.open_table(ORDER_ITEMS_TABLE)?;
        match items.get((order_id, order_detail_id))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_items_for_order(&self, order_id: i64) -> StorageResult<Vec<OrderItem>> {
        let read_txn = self.db.begin_read()?;
        let items = read_txn.open_table(ORDER_ITEMS_TABLE)?;
        let mut result = Vec::new();
        let range_start = (order_id, i64::MIN);
        let range_end = (order_id, i64::MAX);
        for entry in items.range(range_start..=range_end)? {
            let (_key, value) = entry?;
            result.push(serde_json::from_slice(value.value())?);
        }
        result.sort_by_key(|item: &OrderItem| item.created_at);
        Ok(result)
    }

    /// Undelivered items across all open orders (kitchen bootstrap)
    pub fn list_pending_items(&self) -> StorageResult<Vec<OrderItem>> {
        let read_txn = self.db.begin_read()?;
        let active = read_txn.open_table(ACTIVE_ORDERS_TABLE)?;
        let items = read_txn.open_table(ORDER_ITEMS_TABLE)?;
        let mut result: Vec<OrderItem> = Vec::new();
        for entry in active.iter()? {
            let (_table_id, order_id) = entry?;
            let order_id = order_id.value();
            for item_entry in items.range((order_id, i64::MIN)..=(order_id, i64::MAX))? {
                let (_key, value) = item_entry?;
                let item: OrderItem = serde_json::from_slice(value.value())?;
                if item.status == shared::models::ItemStatus::Pending {
                    result.push(item);
                }
            }
        }
        result.sort_by_key(|item| item.created_at);
        Ok(result)
    }

    pub fn get_payment(&self, payment_id: i64) -> StorageResult<Option<Payment>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(PAYMENTS_TABLE)?;
        match t.get(payment_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// The user's open attendance span, if clocked in
    pub fn open_attendance_for_user(
        &self,
        user_id: i64,
    ) -> StorageResult<Option<AttendanceRecord>> {
        let read_txn = self.db.begin_read()?;
        let open = read_txn.open_table(OPEN_ATTENDANCE_TABLE)?;
        let attendance_id = match open.get(user_id)? {
            Some(guard) => guard.value(),
            None => return Ok(None),
        };
        let records = read_txn.open_table(ATTENDANCE_TABLE)?;
        match records.get(attendance_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn stock_remaining(&self, menu_id: i64) -> StorageResult<Option<StockLevel>> {
        let read_txn = self.db.begin_read()?;
        let t = read_txn.open_table(STOCK_TABLE)?;
        Ok(t.get(menu_id)?.map(|guard| StockLevel {
            menu_id,
            remaining: guard.value(),
        }))
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{ItemStatus, OrderStatus, TableStatus};

    fn seeded_store() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        store
            .seed_tables(&[Table {
                table_id: 5,
                number: 5,
                seat_capacity: 4,
                status: TableStatus::Free,
            }])
            .unwrap();
        store
            .seed_plans(&[Plan {
                plan_id: 2,
                name: "Premium".to_string(),
                price_per_person: 29900,
            }])
            .unwrap();
        store
    }

    fn sample_order(order_id: i64) -> Order {
        Order {
            order_id,
            order_token: format!("tok-{order_id}"),
            table_id: 5,
            service_type: "ชาบู".to_string(),
            customer_quantity: 4,
            plan_id: 2,
            plan_price_per_person: 29900,
            charged_total: 119600,
            start_time: 1,
            status: OrderStatus::Active,
            closed_time: None,
        }
    }

    #[test]
    fn seed_and_read_back() {
        let store = seeded_store();
        let table = store.get_table(5).unwrap().unwrap();
        assert_eq!(table.seat_capacity, 4);
        assert!(table.is_free());
        assert_eq!(store.get_plan(2).unwrap().unwrap().price_per_person, 29900);
        assert!(store.get_table(99).unwrap().is_none());
    }

    #[test]
    fn order_commit_and_token_lookup() {
        let store = seeded_store();
        let order = sample_order(100);

        let txn = store.begin_write().unwrap();
        store.put_order(&txn, &order).unwrap();
        store.register_token(&txn, &order.order_token, 100).unwrap();
        store.link_active_order(&txn, 5, 100).unwrap();
        txn.commit().unwrap();

        assert_eq!(store.active_order_for_table(5).unwrap(), Some(100));
        let by_token = store.find_order_by_token("tok-100").unwrap().unwrap();
        assert_eq!(by_token.order_id, 100);
        assert!(store.find_order_by_token("nope").unwrap().is_none());
        assert_eq!(store.list_active_orders().unwrap().len(), 1);
    }

    #[test]
    fn uncommitted_writes_are_invisible() {
        let store = seeded_store();
        let txn = store.begin_write().unwrap();
        store.put_order(&txn, &sample_order(100)).unwrap();
        txn.abort().unwrap();
        assert!(store.get_order(100).unwrap().is_none());
    }

    #[test]
    fn item_index_and_pending_scan() {
        let store = seeded_store();
        let order = sample_order(100);
        let txn = store.begin_write().unwrap();
        store.put_order(&txn, &order).unwrap();
        store.link_active_order(&txn, 5, 100).unwrap();
        for (detail_id, status) in [(11, ItemStatus::Pending), (12, ItemStatus::Delivered)] {
            store
                .put_order_item(
                    &txn,
                    &OrderItem {
                        order_detail_id: detail_id,
                        order_id: 100,
                        menu_id: 7,
                        quantity: 1,
                        status,
                        created_at: detail_id,
                        delivered_at: None,
                    },
                )
                .unwrap();
        }
        txn.commit().unwrap();

        assert_eq!(store.get_order_item(11).unwrap().unwrap().order_id, 100);
        assert_eq!(store.list_items_for_order(100).unwrap().len(), 2);
        let pending = store.list_pending_items().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_detail_id, 11);
    }

    #[test]
    fn stock_take_paths() {
        let store = seeded_store();
        store.set_stock(7, 3).unwrap();

        let txn = store.begin_write().unwrap();
        assert_eq!(store.take_stock(&txn, 7, 2).unwrap(), StockTake::Taken(1));
        assert_eq!(
            store.take_stock(&txn, 7, 2).unwrap(),
            StockTake::Insufficient(1)
        );
        assert_eq!(store.take_stock(&txn, 999, 2).unwrap(), StockTake::Untracked);
        txn.commit().unwrap();

        assert_eq!(store.stock_remaining(7).unwrap().unwrap().remaining, 1);
    }

    #[test]
    fn open_attendance_index() {
        let store = seeded_store();
        let record = AttendanceRecord {
            attendance_id: 900,
            user_id: 3,
            clock_in_time: 10,
            clock_out_time: None,
        };
        let txn = store.begin_write().unwrap();
        store.put_attendance(&txn, &record).unwrap();
        store.set_open_attendance(&txn, 3, 900).unwrap();
        txn.commit().unwrap();

        assert!(store.open_attendance_for_user(3).unwrap().unwrap().is_open());

        let txn = store.begin_write().unwrap();
        store.clear_open_attendance(&txn, 3).unwrap();
        txn.commit().unwrap();
        assert!(store.open_attendance_for_user(3).unwrap().is_none());
    }
}
