//! Per-resource critical sections
//!
//! One async mutex per logical resource (a table, a user), held for
//! the read-decide-commit sequence and nothing else. Two requests
//! against different keys never contend; two against the same key are
//! strictly serialized, which is the invariant the whole coordinator
//! exists to protect.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::{GatewayError, GatewayResult};

/// Logical resource a mutation locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Table/order mutations (an order locks its owning table)
    Table(i64),
    /// Attendance mutations
    User(i64),
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKey::Table(id) => write!(f, "table:{id}"),
            ResourceKey::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Registry of per-resource mutexes
///
/// Entries are created on first use and kept for the process lifetime;
/// the population is bounded by the physical table count plus the
/// staff roster, so there is nothing to reclaim.
pub struct ResourceLocks {
    locks: DashMap<ResourceKey, Arc<Mutex<()>>>,
    wait: Duration,
}

impl ResourceLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            wait,
        }
    }

    /// Acquire the critical section for `key`, waiting at most the
    /// configured budget. Expiry fails with [`GatewayError::Busy`]
    /// rather than queuing indefinitely, so a stuck holder cannot
    /// starve the floor.
    pub async fn acquire(&self, key: ResourceKey) -> GatewayResult<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.wait, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                tracing::warn!(resource = %key, wait_ms = self.wait.as_millis() as u64, "Lock wait expired");
                Err(GatewayError::Busy(format!(
                    "could not acquire {key} within {}ms",
                    self.wait.as_millis()
                )))
            }
        }
    }
}
