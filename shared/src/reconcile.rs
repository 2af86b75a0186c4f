//! Line-item planning for order creation and order updates
//!
//! Lines are identified by ProductID within one order. An update only ever
//! adds lines; a submitted line whose ProductID already exists must match the
//! stored line exactly.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::OrderItemInput;

/// The stored values of an active line that an update may not change
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLine {
    pub product_id: String,
    pub supplier_id: i64,
    pub qty: i32,
    pub price: Decimal,
    pub total_price: Decimal,
    pub check: bool,
}

impl StoredLine {
    fn matches(&self, item: &OrderItemInput) -> bool {
        self.supplier_id == item.supplier_id
            && self.qty == item.qty
            && self.price == item.price
            && self.total_price == item.total_price
            && self.check == item.check
    }
}

impl From<&OrderItemInput> for StoredLine {
    fn from(item: &OrderItemInput) -> Self {
        Self {
            product_id: item.product_id.clone(),
            supplier_id: item.supplier_id,
            qty: item.qty,
            price: item.price,
            total_price: item.total_price,
            check: item.check,
        }
    }
}

/// A purchase request to insert, already linked to its sales line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchasePlan {
    pub sales_id: i64,
    pub product_id: String,
    pub supplier_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Existing lines cannot be edited through an order update
    #[error("existing lines cannot be changed through an order update: {}", .0.join(", "))]
    ChangedLines(Vec<String>),

    /// An inserted line did not come back from the database
    #[error("no sales line was returned for product {0}")]
    MissingSalesLine(String),
}

/// Items of `submitted` whose ProductID is not yet stored, in submission order
pub fn new_items<'a>(
    stored: &[StoredLine],
    submitted: &'a [OrderItemInput],
) -> Result<Vec<&'a OrderItemInput>, ReconcileError> {
    let by_product: HashMap<&str, &StoredLine> = stored
        .iter()
        .map(|line| (line.product_id.as_str(), line))
        .collect();

    let mut changed = Vec::new();
    let mut fresh = Vec::new();

    for item in submitted {
        match by_product.get(item.product_id.as_str()) {
            Some(line) if line.matches(item) => {}
            Some(_) => changed.push(item.product_id.clone()),
            None => fresh.push(item),
        }
    }

    if !changed.is_empty() {
        return Err(ReconcileError::ChangedLines(changed));
    }
    Ok(fresh)
}

/// Link every item that needs purchasing to the SalesID the database returned for it
pub fn plan_purchase_requests<'a, I>(
    items: I,
    sales_ids: &HashMap<String, i64>,
) -> Result<Vec<PurchasePlan>, ReconcileError>
where
    I: IntoIterator<Item = &'a OrderItemInput>,
{
    items
        .into_iter()
        .filter(|item| item.needs_purchase())
        .map(|item| {
            sales_ids
                .get(&item.product_id)
                .map(|sales_id| PurchasePlan {
                    sales_id: *sales_id,
                    product_id: item.product_id.clone(),
                    supplier_id: item.supplier_id,
                })
                .ok_or_else(|| ReconcileError::MissingSalesLine(item.product_id.clone()))
        })
        .collect()
}

/// ProductIDs that appear more than once in one submission
pub fn duplicate_products(items: &[OrderItemInput]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for item in items {
        if !seen.insert(item.product_id.as_str()) && !duplicates.contains(&item.product_id) {
            duplicates.push(item.product_id.clone());
        }
    }
    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product: &str, qty: i32, check: bool) -> OrderItemInput {
        OrderItemInput {
            product_id: product.to_string(),
            supplier_id: 1,
            qty,
            price: Decimal::from(10),
            total_price: Decimal::from(10 * qty),
            check,
        }
    }

    #[test]
    fn test_new_items_only_unknown_products() {
        let stored = vec![StoredLine::from(&item("A", 1, true))];
        let submitted = vec![item("A", 1, true), item("B", 2, false)];

        let fresh = new_items(&stored, &submitted).unwrap();

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].product_id, "B");
    }

    #[test]
    fn test_new_items_identical_resubmission_is_empty() {
        let submitted = vec![item("A", 1, true), item("B", 2, false)];
        let stored: Vec<StoredLine> = submitted.iter().map(StoredLine::from).collect();

        assert!(new_items(&stored, &submitted).unwrap().is_empty());
    }

    #[test]
    fn test_new_items_rejects_changed_quantity() {
        let stored = vec![StoredLine::from(&item("A", 1, true))];
        let submitted = vec![item("A", 3, true), item("B", 1, false)];

        assert_eq!(
            new_items(&stored, &submitted),
            Err(ReconcileError::ChangedLines(vec!["A".to_string()]))
        );
    }

    #[test]
    fn test_omitted_lines_are_left_alone() {
        let stored = vec![
            StoredLine::from(&item("A", 1, true)),
            StoredLine::from(&item("B", 1, true)),
        ];
        let submitted = vec![item("A", 1, true)];

        assert!(new_items(&stored, &submitted).unwrap().is_empty());
    }

    #[test]
    fn test_plan_purchase_requests_links_by_product() {
        let items = vec![item("A", 2, true), item("B", 1, false), item("C", 1, false)];
        let sales_ids = HashMap::from([
            ("A".to_string(), 100),
            ("B".to_string(), 205),
            ("C".to_string(), 101),
        ]);

        let plans = plan_purchase_requests(&items, &sales_ids).unwrap();

        assert_eq!(
            plans,
            vec![
                PurchasePlan { sales_id: 205, product_id: "B".into(), supplier_id: 1 },
                PurchasePlan { sales_id: 101, product_id: "C".into(), supplier_id: 1 },
            ]
        );
    }

    #[test]
    fn test_plan_purchase_requests_missing_line() {
        let items = vec![item("B", 1, false)];
        assert_eq!(
            plan_purchase_requests(&items, &HashMap::new()),
            Err(ReconcileError::MissingSalesLine("B".to_string()))
        );
    }

    #[test]
    fn test_duplicate_products() {
        let items = vec![item("A", 1, true), item("B", 1, true), item("A", 2, true), item("A", 3, true)];
        assert_eq!(duplicate_products(&items), vec!["A".to_string()]);
    }
}
