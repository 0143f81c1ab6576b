//! Stock Ledger Model

use serde::{Deserialize, Serialize};

/// Remaining stock for one menu entry
///
/// Menu entries without a ledger row are untracked (unlimited); only
/// dishes the shop counts (e.g. daily specials) get a row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub menu_id: i64,
    pub remaining: i64,
}
