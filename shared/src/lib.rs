//! Shared types for the floor coordinator
//!
//! Common types used by both the floor server and its client sessions:
//! domain models, domain events and their broadcast channels, the
//! connect-time declaration, mutation request payloads, unified error
//! codes, and id/time utilities.

pub mod connect;
pub mod error;
pub mod event;
pub mod models;
pub mod request;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use connect::{ConnectRequest, Role};
pub use error::ErrorCode;
pub use event::{Channel, DomainEvent, EventPayload};
