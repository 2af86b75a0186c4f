//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Staff roles carried by an authenticated session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Sales,
    Purchase,
    Warehouse,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Sales => "sales",
            Role::Purchase => "purchase",
            Role::Warehouse => "warehouse",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles allowed to create, edit and delete sales orders
pub const ORDER_WRITERS: &[Role] = &[Role::Admin, Role::Sales];

/// Roles allowed to raise PO numbers and contact suppliers
pub const PURCHASING: &[Role] = &[Role::Admin, Role::Purchase];

/// Roles allowed to record receiving and delivery outcomes
pub const FULFILMENT: &[Role] = &[Role::Admin, Role::Purchase, Role::Warehouse];
