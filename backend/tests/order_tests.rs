//! Order write-path tests
//!
//! Tests for:
//! - Item validation before any write
//! - Update reconciliation (new lines only, idempotent resubmission)
//! - Purchase request planning keyed by SalesID
//! - The line delete guard

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    can_delete_product, new_items, plan_purchase_requests, validate_order_items, OrderItemInput,
    ReconcileError, SoStatus, StoredLine,
};

// ============================================================================
// Helpers
// ============================================================================

fn item(product: &str, qty: i32, price: i64, check: bool) -> OrderItemInput {
    OrderItemInput {
        product_id: product.to_string(),
        supplier_id: 1,
        qty,
        price: Decimal::from(price),
        total_price: Decimal::from(price * i64::from(qty)),
        check,
    }
}

fn stored(items: &[OrderItemInput]) -> Vec<StoredLine> {
    items.iter().map(StoredLine::from).collect()
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn item_strategy() -> impl Strategy<Value = OrderItemInput> {
    ("[A-Z]{2}-[0-9]{2}", 1i32..20, 0i64..5_000, any::<bool>())
        .prop_map(|(product, qty, price, check)| item(&product, qty, price, check))
}

fn distinct_items_strategy() -> impl Strategy<Value = Vec<OrderItemInput>> {
    prop::collection::vec(item_strategy(), 1..12).prop_map(|items| {
        let mut seen = std::collections::HashSet::new();
        items
            .into_iter()
            .filter(|i| seen.insert(i.product_id.clone()))
            .collect()
    })
}

fn so_status_strategy() -> impl Strategy<Value = SoStatus> {
    prop::sample::select(SoStatus::ALL.to_vec())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Two lines, one in stock: one purchase request linked to the second line
    #[test]
    fn test_scenario_one_purchase_request_for_two_lines() {
        let items = vec![item("CHAIR-01", 2, 10, true), item("TABLE-01", 1, 20, false)];
        assert!(validate_order_items(&items).is_ok());

        let sales_ids: HashMap<String, i64> =
            [("CHAIR-01".to_string(), 41), ("TABLE-01".to_string(), 42)].into();
        let plans = plan_purchase_requests(&items, &sales_ids).unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].sales_id, 42);
        assert_eq!(plans[0].product_id, "TABLE-01");
    }

    /// SalesIDs need not be contiguous or in submission order
    #[test]
    fn test_plans_follow_returned_ids_not_offsets() {
        let items = vec![item("A", 1, 1, false), item("B", 1, 1, false)];
        let sales_ids: HashMap<String, i64> = [("A".to_string(), 900), ("B".to_string(), 17)].into();

        let plans = plan_purchase_requests(&items, &sales_ids).unwrap();
        assert_eq!(plans[0].sales_id, 900);
        assert_eq!(plans[1].sales_id, 17);
    }

    #[test]
    fn test_missing_returned_id_is_an_error() {
        let items = vec![item("A", 1, 1, false)];
        assert!(matches!(
            plan_purchase_requests(&items, &HashMap::new()),
            Err(ReconcileError::MissingSalesLine(_))
        ));
    }

    #[test]
    fn test_update_adds_only_new_products() {
        let existing = vec![item("A", 1, 10, false)];
        let submitted = vec![item("A", 1, 10, false), item("B", 3, 5, true)];

        let fresh = new_items(&stored(&existing), &submitted).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].product_id, "B");
    }

    #[test]
    fn test_update_rejects_changed_quantity() {
        let existing = vec![item("A", 1, 10, false)];
        let submitted = vec![item("A", 2, 10, false)];

        assert_eq!(
            new_items(&stored(&existing), &submitted),
            Err(ReconcileError::ChangedLines(vec!["A".to_string()]))
        );
    }

    #[test]
    fn test_empty_item_list_rejected() {
        let err = validate_order_items(&[]).unwrap_err();
        assert_eq!(err.field, "items");
    }

    #[test]
    fn test_delete_forbidden_for_delivered_line() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(!can_delete_product(SoStatus::Delivered, None, today));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Resubmitting the stored items adds nothing
    #[test]
    fn prop_identical_resubmission_is_idempotent(items in distinct_items_strategy()) {
        let fresh = new_items(&stored(&items), &items).unwrap();
        prop_assert!(fresh.is_empty());
    }

    /// Exactly the unstored products are added, and only unchecked ones are purchased
    #[test]
    fn prop_update_adds_exactly_new_products(
        items in distinct_items_strategy(),
        split in 0usize..12,
    ) {
        let split = split.min(items.len());
        let (existing, _) = items.split_at(split);

        let fresh = new_items(&stored(existing), &items).unwrap();
        prop_assert_eq!(fresh.len(), items.len() - split);

        let sales_ids: HashMap<String, i64> = fresh
            .iter()
            .enumerate()
            .map(|(i, item)| (item.product_id.clone(), 1000 + i as i64))
            .collect();
        let plans = plan_purchase_requests(fresh.iter().copied(), &sales_ids).unwrap();
        prop_assert_eq!(plans.len(), fresh.iter().filter(|i| !i.check).count());
        for plan in &plans {
            prop_assert_eq!(Some(&plan.sales_id), sales_ids.get(&plan.product_id));
        }
    }

    /// Delivered lines and lines on or past their delivery date cannot be deleted
    #[test]
    fn prop_delete_guard(
        status in so_status_strategy(),
        offset in -30i64..30,
    ) {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let delivery_date = today + Duration::days(offset);
        let allowed = can_delete_product(status, Some(delivery_date), today);

        if matches!(status, SoStatus::Received | SoStatus::ScheduledForDelivery | SoStatus::Delivered)
            || delivery_date <= today
        {
            prop_assert!(!allowed);
        } else {
            prop_assert!(allowed);
        }
    }
}
