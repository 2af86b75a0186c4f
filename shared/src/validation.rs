//! Validation utilities and write guards for the Furniture Order System

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{OrderItemInput, SoStatus};
use crate::reconcile::duplicate_products;

// ============================================================================
// Order Validations
// ============================================================================

/// A field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a submitted item list before anything is written
pub fn validate_order_items(items: &[OrderItemInput]) -> Result<(), FieldError> {
    if items.is_empty() {
        return Err(FieldError::new("items", "At least one item is required"));
    }

    for (index, item) in items.iter().enumerate() {
        if item.product_id.trim().is_empty() {
            return Err(FieldError::new(
                format!("items[{}].productId", index),
                "Product ID is required",
            ));
        }
        if item.qty <= 0 {
            return Err(FieldError::new(
                format!("items[{}].qty", index),
                "Quantity must be positive",
            ));
        }
        if item.price < Decimal::ZERO || item.total_price < Decimal::ZERO {
            return Err(FieldError::new(
                format!("items[{}].price", index),
                "Prices cannot be negative",
            ));
        }
    }

    let duplicates = duplicate_products(items);
    if !duplicates.is_empty() {
        return Err(FieldError::new(
            "items",
            format!("Products listed more than once: {}", duplicates.join(", ")),
        ));
    }

    Ok(())
}

// ============================================================================
// Delete Guard
// ============================================================================

/// Whether a sales line may still be deleted.
///
/// Forbidden once the goods have reached the warehouse or the customer, and
/// from the delivery date onward (`today` is the UTC date).
pub fn can_delete_product(
    so_status: SoStatus,
    delivery_date: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    if matches!(
        so_status,
        SoStatus::Received | SoStatus::ScheduledForDelivery | SoStatus::Delivered
    ) {
        return false;
    }

    match delivery_date {
        Some(date) => today < date,
        None => true,
    }
}

// ============================================================================
// Payment Gate
// ============================================================================

/// Payment figures for one selected purchase request
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSnapshot {
    pub purchase_id: i64,
    pub total_price: Decimal,
    pub total_paid_amount: Decimal,
}

/// A request whose paid ratio is below the threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentShortfall {
    pub purchase_id: i64,
    pub total_price: Decimal,
    pub total_paid_amount: Decimal,
    pub paid_ratio: Decimal,
}

/// Outcome of the payment gate for a whole batch
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentGate {
    Pass,
    Insufficient(Vec<PaymentShortfall>),
}

impl PaymentGate {
    pub fn passed(&self) -> bool {
        matches!(self, PaymentGate::Pass)
    }
}

/// Check every selected request; one shortfall blocks the batch.
/// Lines without a positive total are not gated.
pub fn evaluate_payment_gate(snapshots: &[PaymentSnapshot], min_paid_ratio: Decimal) -> PaymentGate {
    let shortfalls: Vec<PaymentShortfall> = snapshots
        .iter()
        .filter(|s| s.total_price > Decimal::ZERO)
        .filter_map(|s| {
            let paid_ratio = s.total_paid_amount / s.total_price;
            (paid_ratio < min_paid_ratio).then(|| PaymentShortfall {
                purchase_id: s.purchase_id,
                total_price: s.total_price,
                total_paid_amount: s.total_paid_amount,
                paid_ratio: paid_ratio.round_dp(4),
            })
        })
        .collect();

    if shortfalls.is_empty() {
        PaymentGate::Pass
    } else {
        PaymentGate::Insufficient(shortfalls)
    }
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && email.len() >= 5 => {
            Ok(())
        }
        _ => Err("Invalid email format"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(product: &str) -> OrderItemInput {
        OrderItemInput {
            product_id: product.to_string(),
            supplier_id: 1,
            qty: 1,
            price: Decimal::from(10),
            total_price: Decimal::from(10),
            check: false,
        }
    }

    fn snapshot(id: i64, total: i64, paid: i64) -> PaymentSnapshot {
        PaymentSnapshot {
            purchase_id: id,
            total_price: Decimal::from(total),
            total_paid_amount: Decimal::from(paid),
        }
    }

    // ========================================================================
    // Order Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_order_items_valid() {
        assert!(validate_order_items(&[item("A"), item("B")]).is_ok());
    }

    #[test]
    fn test_validate_order_items_empty() {
        let err = validate_order_items(&[]).unwrap_err();
        assert_eq!(err.field, "items");
    }

    #[test]
    fn test_validate_order_items_zero_qty() {
        let mut bad = item("A");
        bad.qty = 0;
        let err = validate_order_items(&[item("B"), bad]).unwrap_err();
        assert_eq!(err.field, "items[1].qty");
    }

    #[test]
    fn test_validate_order_items_negative_price() {
        let mut bad = item("A");
        bad.price = Decimal::from(-1);
        assert!(validate_order_items(&[bad]).is_err());
    }

    #[test]
    fn test_validate_order_items_duplicates() {
        let err = validate_order_items(&[item("A"), item("A")]).unwrap_err();
        assert!(err.message.contains('A'));
    }

    // ========================================================================
    // Delete Guard Tests
    // ========================================================================

    #[test]
    fn test_can_delete_not_delivered_before_delivery_date() {
        assert!(can_delete_product(
            SoStatus::NotDelivered,
            Some(day(2024, 1, 10)),
            day(2024, 1, 9)
        ));
    }

    #[test]
    fn test_cannot_delete_on_delivery_date() {
        assert!(!can_delete_product(
            SoStatus::NotDelivered,
            Some(day(2024, 1, 10)),
            day(2024, 1, 10)
        ));
    }

    #[test]
    fn test_cannot_delete_after_delivery_date() {
        assert!(!can_delete_product(
            SoStatus::NotDelivered,
            Some(day(2024, 1, 10)),
            day(2024, 2, 1)
        ));
    }

    #[test]
    fn test_cannot_delete_received_scheduled_or_delivered() {
        for status in [
            SoStatus::Received,
            SoStatus::ScheduledForDelivery,
            SoStatus::Delivered,
        ] {
            assert!(!can_delete_product(status, None, day(2024, 1, 1)));
        }
    }

    #[test]
    fn test_can_delete_out_for_delivery_without_date() {
        assert!(can_delete_product(SoStatus::OutForDelivery, None, day(2024, 1, 1)));
    }

    // ========================================================================
    // Payment Gate Tests
    // ========================================================================

    #[test]
    fn test_payment_gate_passes_at_half() {
        let gate = evaluate_payment_gate(&[snapshot(1, 100, 50)], Decimal::new(5, 1));
        assert!(gate.passed());
    }

    #[test]
    fn test_payment_gate_one_shortfall_blocks_batch() {
        let gate = evaluate_payment_gate(
            &[snapshot(1, 100, 100), snapshot(2, 100, 49)],
            Decimal::new(5, 1),
        );
        match gate {
            PaymentGate::Insufficient(shortfalls) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].purchase_id, 2);
                assert_eq!(shortfalls[0].paid_ratio, Decimal::new(49, 2));
            }
            PaymentGate::Pass => panic!("gate should not pass"),
        }
    }

    #[test]
    fn test_payment_gate_ignores_zero_totals() {
        let gate = evaluate_payment_gate(&[snapshot(1, 0, 0)], Decimal::new(5, 1));
        assert!(gate.passed());
    }

    // ========================================================================
    // General Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("orders@acme-furniture.com").is_ok());
        assert!(validate_email("a.b@supplier.co.nz").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("no@domain").is_err());
        assert!(validate_email("@x.com").is_err());
    }
}
