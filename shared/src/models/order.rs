//! Sales order models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Delivery fulfilment state of a sales line (SOStatus)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoStatus {
    #[serde(rename = "Not Delivered")]
    NotDelivered,
    #[serde(rename = "Received")]
    Received,
    #[serde(rename = "Scheduled for Delivery")]
    ScheduledForDelivery,
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    #[serde(rename = "Delivered")]
    Delivered,
}

impl SoStatus {
    pub const ALL: [SoStatus; 5] = [
        SoStatus::NotDelivered,
        SoStatus::Received,
        SoStatus::ScheduledForDelivery,
        SoStatus::OutForDelivery,
        SoStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoStatus::NotDelivered => "Not Delivered",
            SoStatus::Received => "Received",
            SoStatus::ScheduledForDelivery => "Scheduled for Delivery",
            SoStatus::OutForDelivery => "Out for Delivery",
            SoStatus::Delivered => "Delivered",
        }
    }
}

impl Default for SoStatus {
    fn default() -> Self {
        SoStatus::NotDelivered
    }
}

impl std::fmt::Display for SoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sales line status '{}'", s))
    }
}

/// Order-level fields stored once per SO number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderFields {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "Customer email is not a valid address"))]
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub shipping_address: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub total_paid_amount: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub gst: Decimal,
    pub notes: Option<String>,
}

/// One submitted product line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: String,
    pub supplier_id: i64,
    pub qty: i32,
    pub price: Decimal,
    pub total_price: Decimal,
    /// Already in stock; no purchase request is raised
    #[serde(default)]
    pub check: bool,
}

/// Input for creating an order
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    #[serde(flatten)]
    #[validate]
    pub fields: OrderFields,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<OrderItemInput>,
}

/// Input for updating an order: the full desired item list plus shared fields
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderInput {
    #[serde(flatten)]
    #[validate]
    pub fields: OrderFields,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<OrderItemInput>,
}

/// Order aggregate root
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrder {
    pub so_number: String,
    pub order_date: NaiveDate,
    #[serde(flatten)]
    pub fields: OrderFields,
    pub is_active: bool,
    pub created_by: String,
    pub changed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line of an order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesLineItem {
    /// SalesID
    pub id: i64,
    pub so_number: String,
    pub product_id: String,
    pub supplier_id: i64,
    pub qty: i32,
    pub price: Decimal,
    pub total_price: Decimal,
    pub check: bool,
    pub so_status: SoStatus,
    pub is_active: bool,
    pub created_by: String,
    pub changed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItemInput {
    pub fn needs_purchase(&self) -> bool {
        !self.check
    }
}
