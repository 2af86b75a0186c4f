//! Domain models for the Furniture Order System

mod order;
mod purchase;
mod supplier;

pub use order::*;
pub use purchase::*;
pub use supplier::*;
