//! HTTP handlers for the Furniture Order System

pub mod health;
pub mod orders;
pub mod purchases;
pub mod supplier;

pub use health::health_check;
pub use orders::{create_order, delete_line_item, get_order, update_order};
pub use purchases::{assign_po_numbers, notify_suppliers, update_status};
pub use supplier::{list_awaiting, submit_responses};
