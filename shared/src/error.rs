//! Unified error codes for the floor coordinator
//!
//! Error codes cross the wire to heterogeneous clients (staff
//! dashboards, kitchen screens, customer web sessions), so they are
//! compact `u16` values organized by category:
//! - 0xxx: general
//! - 4xxx: order/table lifecycle
//! - 5xxx: stock
//! - 8xxx: attendance
//! - 9xxx: system
//!
//! The server never branches on these; they exist for clients to map
//! to localized messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,

    // ==================== 4xxx: Lifecycle ====================
    /// Action illegal for the current table/order state
    InvalidTransition = 4001,

    // ==================== 5xxx: Stock ====================
    /// Stock ledger insufficient for the requested quantity
    OutOfStock = 5001,

    // ==================== 8xxx: Attendance ====================
    /// User already has an open attendance record
    AlreadyClockedIn = 8001,
    /// User has no open attendance record
    NotClockedIn = 8002,

    // ==================== 9xxx: System ====================
    /// Commit failed despite a legal transition; caller must resubmit
    StoreConflict = 9001,
    /// Per-resource critical section could not be acquired in time
    Busy = 9002,
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code as u16
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4001 => Ok(ErrorCode::InvalidTransition),
            5001 => Ok(ErrorCode::OutOfStock),
            8001 => Ok(ErrorCode::AlreadyClockedIn),
            8002 => Ok(ErrorCode::NotClockedIn),
            9001 => Ok(ErrorCode::StoreConflict),
            9002 => Ok(ErrorCode::Busy),
            other => Err(format!("unknown error code: {other}")),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u16)
    }
}
