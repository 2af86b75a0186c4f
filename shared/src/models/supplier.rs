//! Supplier answers to purchase requests

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::purchase::PurchaseEvent;

/// Supplier answer to a purchase request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SupplierAnswer {
    Yes,
    No,
    Delayed,
}

/// One entry of a supplier's batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierResponse {
    pub status: SupplierAnswer,
    pub delayed_date: Option<NaiveDate>,
    /// Promised ship date, optional on YES
    pub supplier_date: Option<NaiveDate>,
}

impl SupplierResponse {
    /// The lifecycle event this answer represents
    pub fn to_event(&self) -> Result<PurchaseEvent, &'static str> {
        match self.status {
            SupplierAnswer::Yes => Ok(PurchaseEvent::SupplierConfirmed {
                supplier_date: self.supplier_date,
            }),
            SupplierAnswer::No => Ok(PurchaseEvent::SupplierDeclined),
            SupplierAnswer::Delayed => self
                .delayed_date
                .map(|delayed_date| PurchaseEvent::SupplierDelayed { delayed_date })
                .ok_or("delayedDate is required when status is DELAYED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_supplier_response_map() {
        let json = r#"{"5": {"status": "DELAYED", "delayedDate": "2024-02-01"}, "6": {"status": "YES"}}"#;
        let map: BTreeMap<String, SupplierResponse> = serde_json::from_str(json).unwrap();

        assert_eq!(map["5"].status, SupplierAnswer::Delayed);
        assert_eq!(map["5"].delayed_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(map["6"].status, SupplierAnswer::Yes);
        assert_eq!(map["6"].delayed_date, None);
    }

    #[test]
    fn test_delayed_without_date_is_rejected() {
        let response = SupplierResponse {
            status: SupplierAnswer::Delayed,
            delayed_date: None,
            supplier_date: None,
        };
        assert!(response.to_event().is_err());
    }

    #[test]
    fn test_answers_map_to_events() {
        let yes = SupplierResponse {
            status: SupplierAnswer::Yes,
            delayed_date: None,
            supplier_date: NaiveDate::from_ymd_opt(2024, 1, 30),
        };
        assert_eq!(
            yes.to_event().unwrap(),
            PurchaseEvent::SupplierConfirmed { supplier_date: NaiveDate::from_ymd_opt(2024, 1, 30) }
        );

        let no = SupplierResponse {
            status: SupplierAnswer::No,
            delayed_date: None,
            supplier_date: None,
        };
        assert_eq!(no.to_event().unwrap(), PurchaseEvent::SupplierDeclined);
    }
}
