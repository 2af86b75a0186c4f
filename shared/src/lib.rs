//! Shared types and domain rules for the Furniture Order System
//!
//! This crate holds everything that does not touch I/O: identifier formats,
//! the purchase request state machine, order reconciliation and the guards
//! used by the backend before it writes anything.

pub mod identifiers;
pub mod models;
pub mod reconcile;
pub mod types;
pub mod validation;

pub use identifiers::*;
pub use models::*;
pub use reconcile::*;
pub use types::*;
pub use validation::*;
