//! Dining Table Model

use serde::{Deserialize, Serialize};

/// Occupancy status of a dining table
///
/// `Occupied` holds exactly while one open order (Active or
/// AwaitingPayment) references the table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    #[default]
    Free,
    Occupied,
}

/// Dining table entity (桌台)
///
/// Seeded at setup time from shop configuration; only the lifecycle
/// engine flips `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub table_id: i64,
    /// Display number printed on the physical table
    pub number: u32,
    pub seat_capacity: u32,
    #[serde(default)]
    pub status: TableStatus,
}

impl Table {
    pub fn is_free(&self) -> bool {
        self.status == TableStatus::Free
    }
}
