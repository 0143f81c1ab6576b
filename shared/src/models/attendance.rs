//! Attendance Record Model

use serde::{Deserialize, Serialize};

/// One clock-in/clock-out span for a staff user
///
/// Invariant: at most one record per user with `clock_out_time = None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceRecord {
    pub attendance_id: i64,
    pub user_id: i64,
    pub clock_in_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_out_time: Option<i64>,
}

impl AttendanceRecord {
    /// Still clocked in
    pub fn is_open(&self) -> bool {
        self.clock_out_time.is_none()
    }
}
