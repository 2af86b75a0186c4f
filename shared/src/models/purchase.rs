//! Purchase request lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::order::SoStatus;

/// Lifecycle state of a purchase request (POStatus)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoStatus {
    #[serde(rename = "Not Ordered")]
    NotOrdered,
    #[serde(rename = "PO created")]
    PoCreated,
    #[serde(rename = "Awaiting")]
    Awaiting,
    #[serde(rename = "Confirmed")]
    Confirmed,
    #[serde(rename = "Discontinued")]
    Discontinued,
    #[serde(rename = "Arriving Late")]
    ArrivingLate,
    #[serde(rename = "Received")]
    Received,
    #[serde(rename = "Cancelled")]
    Cancelled,
    #[serde(rename = "Scheduled for Delivery")]
    ScheduledForDelivery,
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    #[serde(rename = "Not Delivered")]
    NotDelivered,
    #[serde(rename = "Delivered")]
    Delivered,
}

impl PoStatus {
    pub const ALL: [PoStatus; 12] = [
        PoStatus::NotOrdered,
        PoStatus::PoCreated,
        PoStatus::Awaiting,
        PoStatus::Confirmed,
        PoStatus::Discontinued,
        PoStatus::ArrivingLate,
        PoStatus::Received,
        PoStatus::Cancelled,
        PoStatus::ScheduledForDelivery,
        PoStatus::OutForDelivery,
        PoStatus::NotDelivered,
        PoStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoStatus::NotOrdered => "Not Ordered",
            PoStatus::PoCreated => "PO created",
            PoStatus::Awaiting => "Awaiting",
            PoStatus::Confirmed => "Confirmed",
            PoStatus::Discontinued => "Discontinued",
            PoStatus::ArrivingLate => "Arriving Late",
            PoStatus::Received => "Received",
            PoStatus::Cancelled => "Cancelled",
            PoStatus::ScheduledForDelivery => "Scheduled for Delivery",
            PoStatus::OutForDelivery => "Out for Delivery",
            PoStatus::NotDelivered => "Not Delivered",
            PoStatus::Delivered => "Delivered",
        }
    }

    /// No event leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PoStatus::Discontinued | PoStatus::Cancelled | PoStatus::Delivered
        )
    }

    /// The sales line status mirrored from this purchase status, if any
    pub fn fulfilment_status(&self) -> Option<SoStatus> {
        match self {
            PoStatus::Received => Some(SoStatus::Received),
            PoStatus::ScheduledForDelivery => Some(SoStatus::ScheduledForDelivery),
            PoStatus::OutForDelivery => Some(SoStatus::OutForDelivery),
            PoStatus::NotDelivered => Some(SoStatus::NotDelivered),
            PoStatus::Delivered => Some(SoStatus::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for PoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PoStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PoStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_string()))
    }
}

/// Something that happens to a purchase request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseEvent {
    /// Staff assigned the PO number
    AssignPoNumber { po_number: String },
    /// Supplier email was queued after the payment gate passed
    NotifySupplier,
    /// Supplier answered YES
    SupplierConfirmed { supplier_date: Option<NaiveDate> },
    /// Supplier answered NO
    SupplierDeclined,
    /// Supplier answered DELAYED
    SupplierDelayed { delayed_date: NaiveDate },
    /// Receiving dock outcome
    Receive { target: PoStatus },
    /// Delivery scheduling outcome
    Dispatch { target: PoStatus },
    /// Handed over to the customer
    Deliver { signature_ref: Option<String> },
}

const RECEIVE_TARGETS: &[PoStatus] = &[PoStatus::Received, PoStatus::Cancelled];

const DISPATCH_TARGETS: &[PoStatus] = &[
    PoStatus::ScheduledForDelivery,
    PoStatus::OutForDelivery,
    PoStatus::NotDelivered,
];

const IN_FULFILMENT: &[PoStatus] = &[
    PoStatus::Received,
    PoStatus::ScheduledForDelivery,
    PoStatus::OutForDelivery,
    PoStatus::NotDelivered,
];

impl PurchaseEvent {
    /// States this event may be applied from
    pub fn allowed_origins(&self) -> &'static [PoStatus] {
        match self {
            PurchaseEvent::AssignPoNumber { .. } => &[PoStatus::NotOrdered, PoStatus::PoCreated],
            PurchaseEvent::NotifySupplier => &[PoStatus::PoCreated, PoStatus::Awaiting],
            PurchaseEvent::SupplierConfirmed { .. } | PurchaseEvent::SupplierDeclined => {
                &[PoStatus::Awaiting, PoStatus::ArrivingLate]
            }
            PurchaseEvent::SupplierDelayed { .. } => &[PoStatus::Awaiting],
            PurchaseEvent::Receive { .. } => &[PoStatus::Confirmed, PoStatus::ArrivingLate],
            PurchaseEvent::Dispatch { .. } | PurchaseEvent::Deliver { .. } => IN_FULFILMENT,
        }
    }

    /// State reached by this event
    pub fn target(&self) -> Result<PoStatus, TransitionError> {
        match self {
            PurchaseEvent::AssignPoNumber { .. } => Ok(PoStatus::PoCreated),
            PurchaseEvent::NotifySupplier => Ok(PoStatus::Awaiting),
            PurchaseEvent::SupplierConfirmed { .. } => Ok(PoStatus::Confirmed),
            PurchaseEvent::SupplierDeclined => Ok(PoStatus::Discontinued),
            PurchaseEvent::SupplierDelayed { .. } => Ok(PoStatus::ArrivingLate),
            PurchaseEvent::Receive { target } if RECEIVE_TARGETS.contains(target) => Ok(*target),
            PurchaseEvent::Dispatch { target } if DISPATCH_TARGETS.contains(target) => Ok(*target),
            PurchaseEvent::Receive { target } | PurchaseEvent::Dispatch { target } => {
                Err(TransitionError::TargetNotAllowed(*target))
            }
            PurchaseEvent::Deliver { signature_ref } => match signature_ref {
                Some(s) if !s.trim().is_empty() => Ok(PoStatus::Delivered),
                _ => Err(TransitionError::MissingSignature),
            },
        }
    }

    /// Staff status change request mapped to the event it represents.
    ///
    /// Only receiving and delivery outcomes may be set directly; the other
    /// states are reached through PO assignment, supplier notification and
    /// supplier responses.
    pub fn for_staff_target(
        target: PoStatus,
        signature_ref: Option<String>,
    ) -> Result<Self, TransitionError> {
        if RECEIVE_TARGETS.contains(&target) {
            Ok(PurchaseEvent::Receive { target })
        } else if DISPATCH_TARGETS.contains(&target) {
            Ok(PurchaseEvent::Dispatch { target })
        } else if target == PoStatus::Delivered {
            Ok(PurchaseEvent::Deliver { signature_ref })
        } else {
            Err(TransitionError::TargetNotAllowed(target))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PurchaseEvent::AssignPoNumber { .. } => "assign_po_number",
            PurchaseEvent::NotifySupplier => "notify_supplier",
            PurchaseEvent::SupplierConfirmed { .. } => "supplier_confirmed",
            PurchaseEvent::SupplierDeclined => "supplier_declined",
            PurchaseEvent::SupplierDelayed { .. } => "supplier_delayed",
            PurchaseEvent::Receive { .. } => "receive",
            PurchaseEvent::Dispatch { .. } => "dispatch",
            PurchaseEvent::Deliver { .. } => "deliver",
        }
    }
}

/// Rejected lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot apply {event} to a purchase request in status '{from}'")]
    IllegalOrigin { from: PoStatus, event: &'static str },

    #[error("status '{0}' cannot be set directly")]
    TargetNotAllowed(PoStatus),

    #[error("delivery requires a captured signature")]
    MissingSignature,

    #[error("unknown purchase status '{0}'")]
    UnknownStatus(String),
}

/// Compute the next state, rejecting events that are not legal from `state`
pub fn transition(state: PoStatus, event: &PurchaseEvent) -> Result<PoStatus, TransitionError> {
    let target = event.target()?;
    if !event.allowed_origins().contains(&state) {
        return Err(TransitionError::IllegalOrigin {
            from: state,
            event: event.name(),
        });
    }
    Ok(target)
}

/// A procurement record raised for one sales line that is not in stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub id: i64,
    /// Owning sales line; `None` once that line has been deleted
    pub sales_id: Option<i64>,
    pub product_id: String,
    pub supplier_id: i64,
    pub po_status: PoStatus,
    pub po_number: Option<String>,
    pub supplier_date: Option<NaiveDate>,
    pub delayed_date: Option<NaiveDate>,
    pub delivery_signature: Option<String>,
    pub is_active: bool,
    pub created_by: String,
    pub changed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    /// Apply an event, updating the status and the fields it carries
    pub fn apply(&mut self, event: &PurchaseEvent) -> Result<PoStatus, TransitionError> {
        let next = transition(self.po_status, event)?;

        match event {
            PurchaseEvent::AssignPoNumber { po_number } => {
                self.po_number = Some(po_number.clone());
            }
            PurchaseEvent::SupplierConfirmed { supplier_date } => {
                if supplier_date.is_some() {
                    self.supplier_date = *supplier_date;
                }
            }
            PurchaseEvent::SupplierDelayed { delayed_date } => {
                self.delayed_date = Some(*delayed_date);
                self.supplier_date = None;
            }
            PurchaseEvent::Deliver { signature_ref } => {
                self.delivery_signature = signature_ref.clone();
            }
            PurchaseEvent::NotifySupplier
            | PurchaseEvent::SupplierDeclined
            | PurchaseEvent::Receive { .. }
            | PurchaseEvent::Dispatch { .. } => {}
        }

        self.po_status = next;
        Ok(next)
    }
}
