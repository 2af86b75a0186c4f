//! Purchase request lifecycle service
//!
//! Every status change goes through [`shared::transition`]: the request row is
//! locked, the event applied in memory, and the result written back together
//! with the mirrored sales line status.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use shared::{generate_po_number, PoStatus, PurchaseEvent, PurchaseRequest};
use sqlx::{PgConnection, PgPool};

use crate::error::{AppError, AppResult};

const PURCHASE_FIELDS: [&str; 14] = [
    "id",
    "sales_id",
    "product_id",
    "supplier_id",
    "po_status",
    "po_number",
    "supplier_date",
    "delayed_date",
    "delivery_signature",
    "is_active",
    "created_by",
    "changed_by",
    "created_at",
    "updated_at",
];

/// Purchase request columns, optionally qualified with a table alias
pub(crate) fn purchase_columns(alias: Option<&str>) -> String {
    PURCHASE_FIELDS
        .iter()
        .map(|field| match alias {
            Some(alias) => format!("{}.{}", alias, field),
            None => field.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raw `purchase_requests` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PurchaseRow {
    pub id: i64,
    pub sales_id: Option<i64>,
    pub product_id: String,
    pub supplier_id: i64,
    pub po_status: String,
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

impl TryFrom<PurchaseRow> for PurchaseRequest {
    type Error = AppError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let po_status = row.po_status.parse::<PoStatus>().map_err(|_| {
            AppError::Internal(format!(
                "purchase request {} has unknown status '{}'",
                row.id, row.po_status
            ))
        })?;

        Ok(PurchaseRequest {
            id: row.id,
            sales_id: row.sales_id,
            product_id: row.product_id,
            supplier_id: row.supplier_id,
            po_status,
            po_number: row.po_number,
            supplier_date: row.supplier_date,
            delayed_date: row.delayed_date,
            delivery_signature: row.delivery_signature,
            is_active: row.is_active,
            created_by: row.created_by,
            changed_by: row.changed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Request row joined with what PO numbering needs
#[derive(Debug, sqlx::FromRow)]
struct NumberingRow {
    #[sqlx(flatten)]
    request: PurchaseRow,
    so_number: Option<String>,
    supplier_code: String,
}

/// Input for a staff status change
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeInput {
    pub status: String,
    /// Reference to the captured delivery signature
    pub signature_ref: Option<String>,
}

/// Input selecting purchase requests
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSelection {
    pub purchase_ids: Vec<i64>,
}

/// Purchase lifecycle service
#[derive(Clone)]
pub struct PurchaseLifecycleService {
    db: PgPool,
}

impl PurchaseLifecycleService {
    /// Create a new PurchaseLifecycleService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Assign PO numbers to the selected requests.
    ///
    /// All or nothing: one unknown id or illegal origin rolls back the batch.
    pub async fn assign_po_numbers(
        &self,
        purchase_ids: &[i64],
        actor: &str,
    ) -> AppResult<Vec<PurchaseRequest>> {
        let ids = dedupe_ids(purchase_ids)?;

        let mut tx = self.db.begin().await?;

        let sql = format!(
            r#"
            SELECT {}, l.so_number, s.supplier_code
            FROM purchase_requests pr
            LEFT JOIN sales_line_items l ON l.id = pr.sales_id
            JOIN suppliers s ON s.id = pr.supplier_id
            WHERE pr.id = ANY($1) AND pr.is_active
            ORDER BY pr.id
            FOR UPDATE OF pr
            "#,
            purchase_columns(Some("pr"))
        );
        let rows = sqlx::query_as::<_, NumberingRow>(&sql)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !rows.iter().any(|row| row.request.id == **id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::NotFound(format!(
                "Purchase request(s) {}",
                missing.join(", ")
            )));
        }

        let mut updated = Vec::with_capacity(rows.len());
        for row in rows {
            let so_number = row.so_number.ok_or_else(|| {
                AppError::validation(
                    "purchaseIds",
                    format!("Purchase request {} has no sales line", row.request.id),
                )
            })?;
            let po_number = generate_po_number(&so_number, &row.supplier_code)?;
            let request = PurchaseRequest::try_from(row.request)?;

            let event = PurchaseEvent::AssignPoNumber { po_number };
            updated.push(apply_locked(&mut tx, request, &event, actor).await?);
        }

        tx.commit().await?;

        tracing::info!(count = updated.len(), user = %actor, "Assigned PO numbers");
        Ok(updated)
    }

    /// Record a receiving or delivery outcome set by staff
    pub async fn apply_status(
        &self,
        purchase_id: i64,
        input: StatusChangeInput,
        actor: &str,
    ) -> AppResult<PurchaseRequest> {
        let target = input.status.parse::<PoStatus>()?;
        let event = PurchaseEvent::for_staff_target(target, input.signature_ref)?;
        self.apply_event(purchase_id, event, actor).await
    }

    /// Apply one lifecycle event to one request
    pub async fn apply_event(
        &self,
        purchase_id: i64,
        event: PurchaseEvent,
        actor: &str,
    ) -> AppResult<PurchaseRequest> {
        let mut tx = self.db.begin().await?;

        let request = lock_request(&mut tx, purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Purchase request {}", purchase_id)))?;

        let updated = apply_locked(&mut tx, request, &event, actor).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Get an active purchase request
    pub async fn get_request(&self, purchase_id: i64) -> AppResult<PurchaseRequest> {
        let sql = format!(
            "SELECT {} FROM purchase_requests WHERE id = $1 AND is_active",
            purchase_columns(None)
        );
        let row = sqlx::query_as::<_, PurchaseRow>(&sql)
            .bind(purchase_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Purchase request {}", purchase_id)))?;

        row.try_into()
    }
}

/// Lock an active request for the rest of the caller's transaction
pub(crate) async fn lock_request(
    conn: &mut PgConnection,
    purchase_id: i64,
) -> AppResult<Option<PurchaseRequest>> {
    let sql = format!(
        "SELECT {} FROM purchase_requests WHERE id = $1 AND is_active FOR UPDATE",
        purchase_columns(None)
    );
    sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(purchase_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(PurchaseRequest::try_from)
        .transpose()
}

/// Apply `event` to a request the caller has locked and persist the result.
///
/// Fulfilment states are copied onto the owning sales line.
pub(crate) async fn apply_locked(
    conn: &mut PgConnection,
    mut request: PurchaseRequest,
    event: &PurchaseEvent,
    actor: &str,
) -> AppResult<PurchaseRequest> {
    let from = request.po_status;
    let next = request.apply(event)?;

    let sql = format!(
        r#"
        UPDATE purchase_requests
        SET po_status = $2,
            po_number = $3,
            supplier_date = $4,
            delayed_date = $5,
            delivery_signature = $6,
            changed_by = $7,
            updated_at = NOW()
        WHERE id = $1 AND is_active
        RETURNING {}
        "#,
        purchase_columns(None)
    );
    let row = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(request.id)
        .bind(next.as_str())
        .bind(&request.po_number)
        .bind(request.supplier_date)
        .bind(request.delayed_date)
        .bind(&request.delivery_signature)
        .bind(actor)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Purchase request {}", request.id)))?;

    if let (Some(so_status), Some(sales_id)) = (next.fulfilment_status(), request.sales_id) {
        sqlx::query(
            r#"
            UPDATE sales_line_items
            SET so_status = $2, changed_by = $3, updated_at = NOW()
            WHERE id = $1 AND is_active
            "#,
        )
        .bind(sales_id)
        .bind(so_status.as_str())
        .bind(actor)
        .execute(&mut *conn)
        .await?;
    }

    tracing::info!(
        purchase_id = request.id,
        event = event.name(),
        from = %from,
        to = %next,
        user = %actor,
        "Purchase request transitioned"
    );

    row.try_into()
}

/// Reject an empty selection and drop repeated ids, keeping first-seen order
pub(crate) fn dedupe_ids(purchase_ids: &[i64]) -> AppResult<Vec<i64>> {
    if purchase_ids.is_empty() {
        return Err(AppError::validation(
            "purchaseIds",
            "At least one purchase request must be selected",
        ));
    }

    let mut ids = Vec::with_capacity(purchase_ids.len());
    for id in purchase_ids {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    Ok(ids)
}
