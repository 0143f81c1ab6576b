//! Buffet Plan Model

use serde::{Deserialize, Serialize};

/// Buffet plan (per-person pricing tier)
///
/// Seeded at setup time. The coordinator reads it exactly once per
/// order, at open-table time, to snapshot the charged price; later
/// catalog edits never touch existing orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub plan_id: i64,
    pub name: String,
    /// Price per person in minor currency units
    pub price_per_person: i64,
}
