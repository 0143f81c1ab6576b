//! Broadcast hub - live connections and event fan-out
//!
//! # Architecture
//!
//! ```text
//! MutationGateway ──publish(Arc<DomainEvent>)──► BroadcastHub
//!                                                    │
//!                                      ┌─────────────┼─────────────┐
//!                                      ▼             ▼             ▼
//!                                 Connection    Connection    Connection
//!                                 (staff)       (kitchen)     (customer)
//!                                 mpsc, FIFO    mpsc, FIFO    mpsc, FIFO
//! ```
//!
//! Each connection gets a bounded mpsc sink and a channel set computed
//! once from its connect-time declaration. Delivery is `try_send`:
//! a consumer that cannot keep up is dropped and must reconnect and
//! re-fetch, never slowing anyone else down. Events are hints to
//! refetch, not a replicated log.
//!
//! The registry is an explicit object created at process start and
//! constructed fresh in tests; nothing here is ambient global state.

use dashmap::DashMap;
use shared::connect::{ConnectRequest, Role};
use shared::event::{Channel, DomainEvent};
use shared::models::Order;
use shared::util::now_millis;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Transport session id, unique per process
pub type ConnectionId = u64;

/// Why a connect-time declaration was refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("customer session requires an order token")]
    MissingToken,

    #[error("unknown order token")]
    UnknownToken,

    #[error("order for this token is no longer open")]
    OrderClosed,
}

/// One live subscriber
///
/// `Connecting -> Subscribed -> (Active | Disconnected)`; the entry is
/// reclaimed on disconnect, and a reconnecting device gets a brand new
/// connection (and, for customers, a fresh token resolution).
struct Connection {
    channels: HashSet<Channel>,
    tx: mpsc::Sender<Arc<DomainEvent>>,
    /// Last liveness-probe response (Unix millis)
    last_seen: AtomicI64,
}

/// Registry of live connections and their fixed subscriptions
pub struct BroadcastHub {
    connections: DashMap<ConnectionId, Connection>,
    next_id: AtomicU64,
    /// Per-connection event buffer; overflow drops the connection
    buffer: usize,
    shutdown: CancellationToken,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a connection, fixing its channel set from the
    /// declaration.
    ///
    /// `token_order` is the order resolved from `decl.order_token` (the
    /// caller looks it up in the store; `None` when the token is absent
    /// or unknown). Malformed or unauthorized declarations are rejected
    /// here, before any subscription exists.
    pub fn connect(
        &self,
        decl: &ConnectRequest,
        token_order: Option<&Order>,
    ) -> Result<(ConnectionId, mpsc::Receiver<Arc<DomainEvent>>), ConnectError> {
        let channels = derive_channels(decl, token_order)?;
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(
            id,
            Connection {
                channels,
                tx,
                last_seen: AtomicI64::new(now_millis()),
            },
        );
        tracing::info!(connection_id = id, role = ?decl.role, "Connection subscribed");
        Ok((id, rx))
    }

    /// Fan out one committed event to every interested connection.
    ///
    /// Fire-and-forget per connection: a full buffer marks the
    /// connection for removal instead of blocking, so one slow consumer
    /// never delays the rest. Within one connection the mpsc preserves
    /// publish order, which is the commit order of the resource.
    pub fn publish(&self, event: &Arc<DomainEvent>) {
        let targets = event.channels();
        let mut doomed: Vec<ConnectionId> = Vec::new();

        for entry in self.connections.iter() {
            if !targets.iter().any(|c| entry.channels.contains(c)) {
                continue;
            }
            match entry.tx.try_send(Arc::clone(event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = *entry.key(),
                        event = event.name(),
                        "Connection buffer full, dropping slow consumer"
                    );
                    doomed.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Receiver already gone; reclaim the entry
                    doomed.push(*entry.key());
                }
            }
        }

        // Remove outside the iteration to avoid holding shard locks
        for id in doomed {
            self.disconnect(id);
        }
    }

    /// Record a liveness-probe response
    pub fn mark_alive(&self, id: ConnectionId) {
        if let Some(conn) = self.connections.get(&id) {
            conn.last_seen.store(now_millis(), Ordering::Relaxed);
        }
    }

    /// Drop a connection and reclaim its subscription entries.
    ///
    /// Terminal: in-flight mutations are unaffected, and the device
    /// must reconnect (and re-fetch state) to see events again.
    pub fn disconnect(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            tracing::info!(connection_id = id, "Connection disconnected");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Drop every connection silent for longer than `timeout`
    pub fn sweep_stale(&self, timeout: Duration) -> usize {
        let cutoff = now_millis() - timeout.as_millis() as i64;
        let stale: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.last_seen.load(Ordering::Relaxed) < cutoff)
            .map(|entry| *entry.key())
            .collect();
        let count = stale.len();
        for id in stale {
            tracing::info!(connection_id = id, "Liveness probe expired, dropping connection");
            self.disconnect(id);
        }
        count
    }

    /// Periodic liveness sweeper; runs until [`BroadcastHub::shutdown`]
    pub fn spawn_probe_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        timeout: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                interval_ms = interval.as_millis() as u64,
                timeout_ms = timeout.as_millis() as u64,
                "Liveness sweeper started"
            );
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let dropped = hub.sweep_stale(timeout);
                        if dropped > 0 {
                            tracing::info!(dropped, "Swept stale connections");
                        }
                    }
                    _ = hub.shutdown.cancelled() => {
                        tracing::info!("Liveness sweeper stopping");
                        return;
                    }
                }
            }
        })
    }

    /// Stop background tasks; existing connections drain naturally
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("connections", &self.connections.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Compute the fixed channel set for a declaration.
///
/// - Staff: the global floor feed, plus one order's detail view when a
///   valid token is presented, plus their own attendance widget.
/// - Kitchen: line-item events only.
/// - Customer: exactly their session's order channel; the token is
///   mandatory and must resolve to an open order.
fn derive_channels(
    decl: &ConnectRequest,
    token_order: Option<&Order>,
) -> Result<HashSet<Channel>, ConnectError> {
    let mut channels = HashSet::new();
    match decl.role {
        Role::Staff => {
            channels.insert(Channel::GlobalStaff);
            if decl.order_token.is_some() {
                let order = resolve_open_order(token_order)?;
                channels.insert(Channel::Order(order.order_id));
            }
            if let Some(user_id) = decl.user_id {
                channels.insert(Channel::User(user_id));
            }
        }
        Role::Kitchen => {
            channels.insert(Channel::Kitchen);
        }
        Role::Customer => {
            if decl.order_token.is_none() {
                return Err(ConnectError::MissingToken);
            }
            let order = resolve_open_order(token_order)?;
            channels.insert(Channel::Order(order.order_id));
        }
    }
    Ok(channels)
}

fn resolve_open_order(token_order: Option<&Order>) -> Result<&Order, ConnectError> {
    let order = token_order.ok_or(ConnectError::UnknownToken)?;
    if !order.is_open() {
        return Err(ConnectError::OrderClosed);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::event::EventPayload;
    use shared::models::{OrderStatus, Table, TableStatus};

    fn open_order(order_id: i64) -> Order {
        Order {
            order_id,
            order_token: "tok".to_string(),
            table_id: 5,
            service_type: "ชาบู".to_string(),
            customer_quantity: 2,
            plan_id: 1,
            plan_price_per_person: 299,
            charged_total: 598,
            start_time: 0,
            status: OrderStatus::Active,
            closed_time: None,
        }
    }

    fn table_event(order_id: i64) -> Arc<DomainEvent> {
        Arc::new(DomainEvent::new(EventPayload::TableStateChanged {
            table: Table {
                table_id: 5,
                number: 5,
                seat_capacity: 4,
                status: TableStatus::Occupied,
            },
            order: open_order(order_id),
        }))
    }

    #[test]
    fn customer_without_token_is_rejected() {
        let decl = ConnectRequest {
            role: Role::Customer,
            order_token: None,
            user_id: None,
        };
        assert_eq!(
            derive_channels(&decl, None),
            Err(ConnectError::MissingToken)
        );
    }

    #[test]
    fn customer_with_unknown_token_is_rejected() {
        let decl = ConnectRequest::customer("bogus");
        assert_eq!(
            derive_channels(&decl, None),
            Err(ConnectError::UnknownToken)
        );
    }

    #[test]
    fn customer_with_closed_order_is_rejected() {
        let mut order = open_order(100);
        order.status = OrderStatus::Closed;
        let decl = ConnectRequest::customer("tok");
        assert_eq!(
            derive_channels(&decl, Some(&order)),
            Err(ConnectError::OrderClosed)
        );
    }

    #[test]
    fn staff_channels_include_own_attendance() {
        let channels = derive_channels(&ConnectRequest::staff_user(9), None).unwrap();
        assert!(channels.contains(&Channel::GlobalStaff));
        assert!(channels.contains(&Channel::User(9)));
        assert_eq!(channels.len(), 2);
    }

    #[tokio::test]
    async fn publish_reaches_interested_connections_only() {
        let hub = BroadcastHub::new(8);
        let order = open_order(100);

        let (_staff_id, mut staff_rx) = hub.connect(&ConnectRequest::staff(), None).unwrap();
        let (_kitchen_id, mut kitchen_rx) = hub.connect(&ConnectRequest::kitchen(), None).unwrap();
        let (_cust_id, mut cust_rx) = hub
            .connect(&ConnectRequest::customer("tok"), Some(&order))
            .unwrap();

        hub.publish(&table_event(100));

        assert_eq!(staff_rx.recv().await.unwrap().name(), "table_state_changed");
        assert_eq!(cust_rx.recv().await.unwrap().name(), "table_state_changed");
        assert!(kitchen_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn customer_only_sees_their_order() {
        let hub = BroadcastHub::new(8);
        let order = open_order(100);
        let (_id, mut rx) = hub
            .connect(&ConnectRequest::customer("tok"), Some(&order))
            .unwrap();

        hub.publish(&table_event(200));
        assert!(rx.try_recv().is_err());

        hub.publish(&table_event(100));
        assert_eq!(rx.recv().await.unwrap().name(), "table_state_changed");
    }

    #[tokio::test]
    async fn slow_consumer_is_dropped_not_waited_on() {
        let hub = BroadcastHub::new(1);
        let (slow_id, _slow_rx) = hub.connect(&ConnectRequest::staff(), None).unwrap();
        let (fast_id, mut fast_rx) = hub.connect(&ConnectRequest::staff(), None).unwrap();

        // First event fills the slow buffer (never drained); the fast
        // consumer drains promptly.
        hub.publish(&table_event(100));
        assert!(fast_rx.try_recv().is_ok());

        // Second event overflows the slow buffer
        hub.publish(&table_event(101));

        assert!(!hub.is_connected(slow_id));
        assert!(hub.is_connected(fast_id));
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn events_are_fifo_per_connection() {
        let hub = BroadcastHub::new(16);
        let (_id, mut rx) = hub.connect(&ConnectRequest::staff(), None).unwrap();

        let first = table_event(100);
        let second = table_event(100);
        hub.publish(&first);
        hub.publish(&second);

        assert_eq!(rx.recv().await.unwrap().event_id, first.event_id);
        assert_eq!(rx.recv().await.unwrap().event_id, second.event_id);
    }

    #[tokio::test]
    async fn sweep_drops_silent_connections() {
        let hub = BroadcastHub::new(8);
        let (id, _rx) = hub.connect(&ConnectRequest::staff(), None).unwrap();

        // Fresh connection survives a generous timeout
        assert_eq!(hub.sweep_stale(Duration::from_secs(60)), 0);
        assert!(hub.is_connected(id));

        // Zero timeout treats everyone as stale
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(hub.sweep_stale(Duration::from_millis(1)), 1);
        assert!(!hub.is_connected(id));
    }

    #[tokio::test]
    async fn mark_alive_keeps_connection_through_sweep() {
        let hub = BroadcastHub::new(8);
        let (id, _rx) = hub.connect(&ConnectRequest::staff(), None).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.mark_alive(id);
        assert_eq!(hub.sweep_stale(Duration::from_millis(8)), 0);
        assert!(hub.is_connected(id));
    }
}
