//! Purchase request lifecycle tests
//!
//! Tests for the guarded state machine:
//! - Legal transitions and the fields they carry
//! - Rejection of illegal origins without changing the request
//! - Supplier answers mapped to lifecycle events

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use shared::{
    transition, PoStatus, PurchaseEvent, PurchaseRequest, SupplierResponse, TransitionError,
};

// ============================================================================
// Helpers
// ============================================================================

fn request(status: PoStatus) -> PurchaseRequest {
    PurchaseRequest {
        id: 5,
        sales_id: Some(12),
        product_id: "BED-QUEEN".to_string(),
        supplier_id: 3,
        po_status: status,
        po_number: Some("PO-20240101-1-ACME".to_string()),
        supplier_date: NaiveDate::from_ymd_opt(2024, 1, 25),
        delayed_date: None,
        delivery_signature: None,
        is_active: true,
        created_by: "sales1".to_string(),
        changed_by: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn status_strategy() -> impl Strategy<Value = PoStatus> {
    prop::sample::select(PoStatus::ALL.to_vec())
}

fn event_strategy() -> impl Strategy<Value = PurchaseEvent> {
    prop_oneof![
        Just(PurchaseEvent::AssignPoNumber {
            po_number: "PO-20240101-1-ACME".to_string()
        }),
        Just(PurchaseEvent::NotifySupplier),
        Just(PurchaseEvent::SupplierConfirmed { supplier_date: None }),
        Just(PurchaseEvent::SupplierDeclined),
        Just(PurchaseEvent::SupplierDelayed {
            delayed_date: date(2024, 2, 1)
        }),
        Just(PurchaseEvent::Receive {
            target: PoStatus::Received
        }),
        Just(PurchaseEvent::Dispatch {
            target: PoStatus::OutForDelivery
        }),
        Just(PurchaseEvent::Deliver {
            signature_ref: Some("sig-001".to_string())
        }),
    ]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_happy_path_to_delivered() {
        let mut pr = request(PoStatus::NotOrdered);
        pr.po_number = None;

        let steps = [
            (
                PurchaseEvent::AssignPoNumber {
                    po_number: "PO-20240101-1-ACME".to_string(),
                },
                PoStatus::PoCreated,
            ),
            (PurchaseEvent::NotifySupplier, PoStatus::Awaiting),
            (
                PurchaseEvent::SupplierConfirmed {
                    supplier_date: Some(date(2024, 1, 30)),
                },
                PoStatus::Confirmed,
            ),
            (
                PurchaseEvent::Receive {
                    target: PoStatus::Received,
                },
                PoStatus::Received,
            ),
            (
                PurchaseEvent::Dispatch {
                    target: PoStatus::ScheduledForDelivery,
                },
                PoStatus::ScheduledForDelivery,
            ),
            (
                PurchaseEvent::Deliver {
                    signature_ref: Some("sig-001".to_string()),
                },
                PoStatus::Delivered,
            ),
        ];

        for (event, expected) in steps {
            assert_eq!(pr.apply(&event).unwrap(), expected);
        }

        assert_eq!(pr.po_number.as_deref(), Some("PO-20240101-1-ACME"));
        assert_eq!(pr.supplier_date, Some(date(2024, 1, 30)));
        assert_eq!(pr.delivery_signature.as_deref(), Some("sig-001"));
    }

    /// `{"5": {"status": "DELAYED", "delayedDate": "2024-02-01"}}`
    #[test]
    fn test_delayed_answer_moves_to_arriving_late() {
        let body = r#"{"5": {"status": "DELAYED", "delayedDate": "2024-02-01"}}"#;
        let answers: BTreeMap<String, SupplierResponse> = serde_json::from_str(body).unwrap();

        let mut pr = request(PoStatus::Awaiting);
        let event = answers["5"].to_event().unwrap();
        assert_eq!(pr.apply(&event).unwrap(), PoStatus::ArrivingLate);
        assert_eq!(pr.delayed_date, Some(date(2024, 2, 1)));
        assert_eq!(pr.supplier_date, None);
    }

    #[test]
    fn test_delayed_answer_requires_date() {
        let answer: SupplierResponse = serde_json::from_str(r#"{"status": "DELAYED"}"#).unwrap();
        assert!(answer.to_event().is_err());
    }

    #[test]
    fn test_arriving_late_can_still_be_confirmed_or_declined() {
        let confirmed = PurchaseEvent::SupplierConfirmed { supplier_date: None };
        assert_eq!(
            transition(PoStatus::ArrivingLate, &confirmed),
            Ok(PoStatus::Confirmed)
        );
        assert_eq!(
            transition(PoStatus::ArrivingLate, &PurchaseEvent::SupplierDeclined),
            Ok(PoStatus::Discontinued)
        );
    }

    #[test]
    fn test_supplier_answer_before_notification_is_rejected() {
        let result = transition(PoStatus::PoCreated, &PurchaseEvent::SupplierDeclined);
        assert!(matches!(result, Err(TransitionError::IllegalOrigin { .. })));
    }

    #[test]
    fn test_delivery_requires_signature() {
        let event = PurchaseEvent::Deliver { signature_ref: None };
        assert_eq!(
            transition(PoStatus::Received, &event),
            Err(TransitionError::MissingSignature)
        );
    }

    #[test]
    fn test_staff_cannot_set_confirmed_directly() {
        assert_eq!(
            PurchaseEvent::for_staff_target(PoStatus::Confirmed, None),
            Err(TransitionError::TargetNotAllowed(PoStatus::Confirmed))
        );
    }

    #[test]
    fn test_fulfilment_statuses_mirror_to_sales_line() {
        assert!(PoStatus::Awaiting.fulfilment_status().is_none());
        assert_eq!(
            PoStatus::Delivered.fulfilment_status().map(|s| s.as_str()),
            Some("Delivered")
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// A rejected event leaves the request exactly as it was
    #[test]
    fn prop_rejected_event_changes_nothing(status in status_strategy(), event in event_strategy()) {
        let mut pr = request(status);
        let before = pr.clone();

        match pr.apply(&event) {
            Ok(next) => {
                prop_assert!(event.allowed_origins().contains(&status));
                prop_assert_eq!(pr.po_status, next);
            }
            Err(_) => prop_assert_eq!(pr, before),
        }
    }

    /// Terminal states accept no event
    #[test]
    fn prop_terminal_states_are_final(status in status_strategy(), event in event_strategy()) {
        prop_assume!(status.is_terminal());
        prop_assert!(transition(status, &event).is_err());
    }
}
