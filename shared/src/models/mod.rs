//! Domain models shared between the floor server and its clients.
//!
//! These are the entities the coordinator owns. Catalog data (menu,
//! staff records, shop settings) lives behind the external CRUD
//! surface and is not modeled here beyond what the coordinator reads.

mod attendance;
mod order;
mod plan;
mod stock;
mod table;

pub use attendance::AttendanceRecord;
pub use order::{ItemStatus, Order, OrderItem, OrderStatus, Payment};
pub use plan::Plan;
pub use stock::StockLevel;
pub use table::{Table, TableStatus};
