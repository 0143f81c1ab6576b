use crate::lifecycle::Rejection;
use crate::store::StorageError;
use shared::error::ErrorCode;
use thiserror::Error;

/// Gateway errors - everything a mutation caller can observe
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed input, rejected before any lock is taken
    #[error("validation failed: {0}")]
    Validation(String),

    /// Action illegal for the current state; no side effects
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("user already clocked in")]
    AlreadyClockedIn,

    #[error("user not clocked in")]
    NotClockedIn,

    #[error("out of stock for menu {menu_id}: requested {requested}, remaining {remaining}")]
    OutOfStock {
        menu_id: i64,
        requested: i64,
        remaining: i64,
    },

    /// The per-resource critical section could not be acquired within
    /// the configured wait; the caller may retry.
    #[error("resource busy: {0}")]
    Busy(String),

    /// Commit failed despite a legal transition; no side effects, the
    /// caller must resubmit.
    #[error("store conflict: {0}")]
    StoreConflict(#[from] StorageError),

    #[error("table not found: {0}")]
    TableNotFound(i64),

    #[error("order not found: {0}")]
    OrderNotFound(i64),

    #[error("order item not found: {0}")]
    ItemNotFound(i64),

    #[error("plan not found: {0}")]
    PlanNotFound(i64),
}

impl From<Rejection> for GatewayError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::InvalidTransition(msg) => GatewayError::InvalidTransition(msg),
            Rejection::Validation(msg) => GatewayError::Validation(msg),
            Rejection::AlreadyClockedIn => GatewayError::AlreadyClockedIn,
            Rejection::NotClockedIn => GatewayError::NotClockedIn,
        }
    }
}

/// 错误码映射（客户端负责本地化）
impl From<&GatewayError> for ErrorCode {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::Validation(_) => ErrorCode::ValidationFailed,
            GatewayError::InvalidTransition(_) => ErrorCode::InvalidTransition,
            GatewayError::AlreadyClockedIn => ErrorCode::AlreadyClockedIn,
            GatewayError::NotClockedIn => ErrorCode::NotClockedIn,
            GatewayError::OutOfStock { .. } => ErrorCode::OutOfStock,
            GatewayError::Busy(_) => ErrorCode::Busy,
            GatewayError::StoreConflict(_) => ErrorCode::StoreConflict,
            GatewayError::TableNotFound(_)
            | GatewayError::OrderNotFound(_)
            | GatewayError::ItemNotFound(_)
            | GatewayError::PlanNotFound(_) => ErrorCode::NotFound,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
