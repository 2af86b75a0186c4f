//! Business logic services for the Furniture Order System

pub mod identifier;
pub mod notification;
pub mod order;
pub mod purchase;
pub mod supplier_confirmation;

pub use notification::NotificationService;
pub use order::OrderService;
pub use purchase::PurchaseLifecycleService;
pub use supplier_confirmation::SupplierConfirmationService;
