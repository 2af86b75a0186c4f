//! Supplier confirmation service
//!
//! Suppliers reach their open purchase requests through a signed link sent in
//! the notification email. Each answer is applied in its own transaction:
//! answers that succeed stay committed when a sibling fails.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::NaiveDate;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use shared::{validate_email, PurchaseRequest, SupplierResponse};
use sqlx::{PgConnection, PgPool};

use crate::error::{AppError, AppResult, EntryFailure};
use crate::services::purchase::{apply_locked, purchase_columns, PurchaseRow};

type HmacSha256 = Hmac<Sha256>;

/// Sign the confirmation link token for a supplier email
pub fn link_token(secret: &str, supplier_email: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Configuration(format!("invalid supplier link secret: {}", e)))?;
    mac.update(supplier_email.trim().to_lowercase().as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Check a confirmation link token in constant time
pub fn verify_link_token(secret: &str, supplier_email: &str, token: &str) -> bool {
    let Ok(signature) = URL_SAFE_NO_PAD.decode(token.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(supplier_email.trim().to_lowercase().as_bytes());
    mac.verify_slice(&signature).is_ok()
}

/// A purchase request waiting for the supplier's answer
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AwaitingRequest {
    pub purchase_id: i64,
    pub po_number: Option<String>,
    pub so_number: Option<String>,
    pub product_id: String,
    pub product_name: Option<String>,
    pub qty: Option<i32>,
    pub po_status: String,
    pub supplier_date: Option<NaiveDate>,
    pub delayed_date: Option<NaiveDate>,
}

/// Answers that were applied
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationReport {
    pub applied: Vec<i64>,
}

/// Supplier confirmation service
#[derive(Clone)]
pub struct SupplierConfirmationService {
    db: PgPool,
    link_secret: String,
}

impl SupplierConfirmationService {
    /// Create a new SupplierConfirmationService instance
    pub fn new(db: PgPool, link_secret: impl Into<String>) -> Self {
        Self {
            db,
            link_secret: link_secret.into(),
        }
    }

    /// Reject requests whose link token does not match the email
    pub fn authorize(&self, supplier_email: &str, token: Option<&str>) -> AppResult<()> {
        validate_email(supplier_email).map_err(|msg| AppError::validation("email", msg))?;

        match token {
            Some(token) if verify_link_token(&self.link_secret, supplier_email, token) => Ok(()),
            Some(_) => {
                tracing::warn!(supplier = %supplier_email, "Rejected supplier link token");
                Err(AppError::InvalidToken)
            }
            None => Err(AppError::Unauthorized(
                "Confirmation link token is required".to_string(),
            )),
        }
    }

    /// List the supplier's active requests still waiting for an answer
    pub async fn list_awaiting(&self, supplier_email: &str) -> AppResult<Vec<AwaitingRequest>> {
        let requests = sqlx::query_as::<_, AwaitingRequest>(
            r#"
            SELECT pr.id AS purchase_id, pr.po_number, l.so_number, pr.product_id,
                   p.name AS product_name, l.qty, pr.po_status, pr.supplier_date, pr.delayed_date
            FROM purchase_requests pr
            JOIN suppliers s ON s.id = pr.supplier_id
            LEFT JOIN sales_line_items l ON l.id = pr.sales_id
            LEFT JOIN products p ON p.product_code = pr.product_id
            WHERE LOWER(s.email) = LOWER($1)
              AND pr.is_active
              AND pr.po_status IN ('Awaiting', 'Arriving Late')
            ORDER BY pr.po_number, pr.id
            "#,
        )
        .bind(supplier_email.trim())
        .fetch_all(&self.db)
        .await?;

        Ok(requests)
    }

    /// Apply a batch of answers keyed by purchase request id.
    ///
    /// Fails with [`AppError::PartialConfirmation`] when any entry could not
    /// be applied; entries applied before or after it remain committed.
    pub async fn apply_responses(
        &self,
        supplier_email: &str,
        responses: BTreeMap<String, SupplierResponse>,
    ) -> AppResult<ConfirmationReport> {
        if responses.is_empty() {
            return Err(AppError::validation("responses", "No answers were submitted"));
        }

        let actor = format!("supplier:{}", supplier_email.trim().to_lowercase());
        let mut applied = Vec::new();
        let mut failures = Vec::new();

        for (key, response) in responses {
            match self.apply_one(supplier_email, &key, &response, &actor).await {
                Ok(request) => applied.push(request.id),
                Err(err) => {
                    tracing::warn!(
                        supplier = %supplier_email,
                        purchase_id = %key,
                        error = %err,
                        "Supplier answer not applied"
                    );
                    failures.push(EntryFailure {
                        purchase_id: key,
                        message: failure_message(&err),
                    });
                }
            }
        }

        tracing::info!(
            supplier = %supplier_email,
            applied = applied.len(),
            failed = failures.len(),
            "Supplier answers processed"
        );

        if failures.is_empty() {
            Ok(ConfirmationReport { applied })
        } else {
            Err(AppError::PartialConfirmation { applied, failures })
        }
    }

    async fn apply_one(
        &self,
        supplier_email: &str,
        key: &str,
        response: &SupplierResponse,
        actor: &str,
    ) -> AppResult<PurchaseRequest> {
        let purchase_id: i64 = key
            .trim()
            .parse()
            .map_err(|_| AppError::validation("purchaseId", format!("'{}' is not a purchase id", key)))?;
        let event = response
            .to_event()
            .map_err(|msg| AppError::validation("delayedDate", msg))?;

        let mut tx = self.db.begin().await?;

        let request = lock_supplier_request(&mut tx, supplier_email, purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Purchase request {}", purchase_id)))?;

        let updated = apply_locked(&mut tx, request, &event, actor).await?;

        tx.commit().await?;
        Ok(updated)
    }
}

/// Lock an active request only if it belongs to the supplier with this email
async fn lock_supplier_request(
    conn: &mut PgConnection,
    supplier_email: &str,
    purchase_id: i64,
) -> AppResult<Option<PurchaseRequest>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM purchase_requests pr
        JOIN suppliers s ON s.id = pr.supplier_id
        WHERE pr.id = $1 AND pr.is_active AND LOWER(s.email) = LOWER($2)
        FOR UPDATE OF pr
        "#,
        purchase_columns(Some("pr"))
    );
    sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(purchase_id)
        .bind(supplier_email.trim())
        .fetch_optional(&mut *conn)
        .await?
        .map(PurchaseRequest::try_from)
        .transpose()
}

/// Caller-facing reason for a failed entry; storage detail stays in the log
fn failure_message(err: &AppError) -> String {
    match err {
        AppError::Validation { message, .. } => message.clone(),
        AppError::NotFound(resource) => format!("{} not found", resource),
        AppError::InvalidStateTransition(msg) | AppError::ValidationError(msg) => msg.clone(),
        _ => "The answer could not be saved".to_string(),
    }
}
