//! Supplier notification service
//!
//! Sending supplier emails happens in two phases. The first is one
//! transaction that moves every selectable request to Awaiting and queues one
//! outbox email per supplier. The second sends the queued emails concurrently
//! and records each delivery attempt. Emails that fail stay pending for the
//! retry worker until `max_attempts`, then are dead-lettered.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    evaluate_payment_gate, PaymentGate, PaymentShortfall, PaymentSnapshot, PurchaseEvent,
    PurchaseRequest,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{Config, SupplierPortalConfig};
use crate::error::{AppError, AppResult};
use crate::external::{EmailDispatcher, EmailError};
use crate::services::purchase::{apply_locked, dedupe_ids, purchase_columns, PurchaseRow};
use crate::services::supplier_confirmation::link_token;

/// How long a claimed outbox row is hidden from other senders
const CLAIM_LEASE_SECS: i64 = 300;

const MAX_BACKOFF_SECS: i64 = 86_400;

/// Delivery state of an outbox email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    DeadLetter,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::DeadLetter => "dead_letter",
        }
    }
}

/// Status of an email after a failed attempt
pub fn status_after_failure(attempts: i32, max_attempts: i32) -> OutboxStatus {
    if attempts >= max_attempts {
        OutboxStatus::DeadLetter
    } else {
        OutboxStatus::Pending
    }
}

/// One request line of a supplier email
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyItem {
    pub purchase_id: i64,
    pub po_number: String,
    pub so_number: String,
    pub product_id: String,
    pub product_name: Option<String>,
    pub qty: i32,
    pub supplier_name: String,
    pub supplier_email: String,
}

/// A queued supplier email
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub supplier_email: String,
    pub subject: String,
    pub html_body: String,
    pub purchase_ids: Vec<i64>,
    pub attempts: i32,
}

/// A selected request that could not be notified
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupFailure {
    pub purchase_id: i64,
    pub reason: String,
}

/// Delivery result for one supplier email
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailResult {
    pub supplier_email: String,
    pub purchase_ids: Vec<i64>,
    pub status: OutboxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a notification request did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReport {
    pub batch_id: Uuid,
    pub notified: Vec<i64>,
    pub failed_lookups: Vec<LookupFailure>,
    pub emails: Vec<EmailResult>,
}

/// Result of a send-supplier-emails request
#[derive(Debug, Clone)]
pub enum SendEmailsOutcome {
    /// The payment gate blocked the batch; nothing was sent or changed
    InsufficientPayment { shortfalls: Vec<PaymentShortfall> },
    Dispatched(NotificationReport),
}

#[derive(Debug, sqlx::FromRow)]
struct NotifyRow {
    #[sqlx(flatten)]
    request: PurchaseRow,
    so_number: Option<String>,
    qty: Option<i32>,
    product_name: Option<String>,
    supplier_name: String,
    supplier_email: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    total_price: Decimal,
    total_paid_amount: Decimal,
}

/// Notification service
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
    mailer: Arc<dyn EmailDispatcher>,
    min_paid_ratio: Decimal,
    max_attempts: i32,
    retry_interval_secs: u64,
    retry_batch_size: i64,
    portal: SupplierPortalConfig,
}

impl NotificationService {
    /// Create a new NotificationService instance
    pub fn new(db: PgPool, mailer: Arc<dyn EmailDispatcher>, config: &Config) -> Self {
        Self {
            db,
            mailer,
            min_paid_ratio: config.notification.min_paid_ratio,
            max_attempts: config.notification.max_attempts,
            retry_interval_secs: config.notification.retry_interval_secs,
            retry_batch_size: config.notification.retry_batch_size,
            portal: config.supplier_portal.clone(),
        }
    }

    /// Notify the suppliers of the selected purchase requests.
    ///
    /// Without `send_anyway`, one request below the paid ratio blocks the
    /// whole batch.
    pub async fn send_supplier_emails(
        &self,
        purchase_ids: &[i64],
        send_anyway: bool,
        actor: &str,
    ) -> AppResult<SendEmailsOutcome> {
        let ids = dedupe_ids(purchase_ids)?;

        if !send_anyway {
            if let PaymentGate::Insufficient(shortfalls) = self.payment_gate(&ids).await? {
                tracing::warn!(
                    blocked = ?shortfalls.iter().map(|s| s.purchase_id).collect::<Vec<_>>(),
                    user = %actor,
                    "Supplier notification blocked by payment gate"
                );
                return Ok(SendEmailsOutcome::InsufficientPayment { shortfalls });
            }
        }

        let batch_id = Uuid::new_v4();
        let (messages, notified, failed_lookups) =
            self.queue_notifications(batch_id, &ids, actor).await?;

        let emails = self.dispatch_outbox(messages).await;

        tracing::info!(
            %batch_id,
            notified = notified.len(),
            failed_lookups = failed_lookups.len(),
            emails = emails.len(),
            user = %actor,
            "Supplier notification batch processed"
        );

        Ok(SendEmailsOutcome::Dispatched(NotificationReport {
            batch_id,
            notified,
            failed_lookups,
            emails,
        }))
    }

    async fn payment_gate(&self, ids: &[i64]) -> AppResult<PaymentGate> {
        let snapshots: Vec<PaymentSnapshot> = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT pr.id, l.total_price, o.total_paid_amount
            FROM purchase_requests pr
            JOIN sales_line_items l ON l.id = pr.sales_id
            JOIN sales_orders o ON o.so_number = l.so_number
            WHERE pr.id = ANY($1) AND pr.is_active
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|row| PaymentSnapshot {
            purchase_id: row.id,
            total_price: row.total_price,
            total_paid_amount: row.total_paid_amount,
        })
        .collect();

        Ok(evaluate_payment_gate(&snapshots, self.min_paid_ratio))
    }

    /// Phase one: status writes and outbox rows in one transaction
    async fn queue_notifications(
        &self,
        batch_id: Uuid,
        ids: &[i64],
        actor: &str,
    ) -> AppResult<(Vec<OutboxMessage>, Vec<i64>, Vec<LookupFailure>)> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            r#"
            SELECT {}, l.so_number, l.qty, p.name AS product_name,
                   s.name AS supplier_name, s.email AS supplier_email
            FROM purchase_requests pr
            JOIN suppliers s ON s.id = pr.supplier_id
            LEFT JOIN sales_line_items l ON l.id = pr.sales_id
            LEFT JOIN products p ON p.product_code = pr.product_id
            WHERE pr.id = ANY($1) AND pr.is_active
            FOR UPDATE OF pr
            "#,
            purchase_columns(Some("pr"))
        );
        let mut rows: BTreeMap<i64, NotifyRow> = sqlx::query_as::<_, NotifyRow>(&sql)
            .bind(ids)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|row| (row.request.id, row))
            .collect();

        let mut items = Vec::new();
        let mut failed_lookups = Vec::new();

        for id in ids {
            let Some(row) = rows.remove(id) else {
                failed_lookups.push(LookupFailure {
                    purchase_id: *id,
                    reason: "Purchase request not found".to_string(),
                });
                continue;
            };

            let (request, item) = match notify_item(row) {
                Ok(pair) => pair,
                Err(reason) => {
                    failed_lookups.push(LookupFailure {
                        purchase_id: *id,
                        reason,
                    });
                    continue;
                }
            };

            match apply_locked(&mut tx, request, &PurchaseEvent::NotifySupplier, actor).await {
                Ok(_) => items.push(item),
                Err(AppError::InvalidStateTransition(reason)) => {
                    failed_lookups.push(LookupFailure {
                        purchase_id: *id,
                        reason,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let notified: Vec<i64> = items.iter().map(|item| item.purchase_id).collect();
        let lease_until = Utc::now() + chrono::Duration::seconds(CLAIM_LEASE_SECS);

        let mut messages = Vec::new();
        for (supplier_email, group) in group_by_supplier(items) {
            let token = link_token(&self.portal.link_secret, &supplier_email)?;
            let link = confirmation_link(&self.portal.base_url, &supplier_email, &token);
            let supplier_name = group
                .first()
                .map(|item| item.supplier_name.clone())
                .unwrap_or_default();
            let subject = format!("Purchase order confirmation request ({} item(s))", group.len());
            let html_body = render_supplier_summary(&supplier_name, &group, &link);
            let purchase_ids: Vec<i64> = group.iter().map(|item| item.purchase_id).collect();

            // Not due for the retry worker until the lease runs out
            let message = sqlx::query_as::<_, OutboxMessage>(
                r#"
                INSERT INTO supplier_email_outbox
                    (batch_id, supplier_email, subject, html_body, purchase_ids, next_attempt_at, created_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, supplier_email, subject, html_body, purchase_ids, attempts
                "#,
            )
            .bind(batch_id)
            .bind(&supplier_email)
            .bind(&subject)
            .bind(&html_body)
            .bind(&purchase_ids)
            .bind(lease_until)
            .bind(actor)
            .fetch_one(&mut *tx)
            .await?;

            messages.push(message);
        }

        tx.commit().await?;

        Ok((messages, notified, failed_lookups))
    }

    /// Phase two: send every message concurrently and record each outcome.
    ///
    /// A failed outbox write is logged for that message only.
    pub async fn dispatch_outbox(&self, messages: Vec<OutboxMessage>) -> Vec<EmailResult> {
        let outcomes = deliver_all(self.mailer.as_ref(), &messages).await;

        let mut results = Vec::with_capacity(messages.len());
        for (message, outcome) in messages.into_iter().zip(outcomes) {
            let result = match outcome {
                Ok(()) => {
                    let recorded = sqlx::query(
                        r#"
                        UPDATE supplier_email_outbox
                        SET status = 'sent', attempts = attempts + 1, last_error = NULL,
                            sent_at = NOW(), updated_at = NOW()
                        WHERE id = $1
                        "#,
                    )
                    .bind(message.id)
                    .execute(&self.db)
                    .await;

                    if let Err(e) = recorded {
                        tracing::error!(
                            outbox_id = message.id,
                            to = %message.supplier_email,
                            error = %e,
                            "Supplier email sent but not recorded"
                        );
                    }

                    EmailResult {
                        supplier_email: message.supplier_email,
                        purchase_ids: message.purchase_ids,
                        status: OutboxStatus::Sent,
                        error: None,
                    }
                }
                Err(err) => {
                    let attempts = message.attempts + 1;
                    let status = status_after_failure(attempts, self.max_attempts);
                    let next_attempt_at =
                        Utc::now() + chrono::Duration::seconds(self.backoff_secs(attempts));

                    let recorded = sqlx::query(
                        r#"
                        UPDATE supplier_email_outbox
                        SET status = $2, attempts = $3, last_error = $4,
                            next_attempt_at = $5, updated_at = NOW()
                        WHERE id = $1
                        "#,
                    )
                    .bind(message.id)
                    .bind(status.as_str())
                    .bind(attempts)
                    .bind(err.to_string())
                    .bind(next_attempt_at)
                    .execute(&self.db)
                    .await;

                    if let Err(e) = recorded {
                        tracing::error!(
                            outbox_id = message.id,
                            to = %message.supplier_email,
                            error = %e,
                            "Failed to record supplier email attempt"
                        );
                    }

                    if status == OutboxStatus::DeadLetter {
                        tracing::error!(
                            outbox_id = message.id,
                            to = %message.supplier_email,
                            attempts,
                            error = %err,
                            "Supplier email dead-lettered"
                        );
                    } else {
                        tracing::warn!(
                            outbox_id = message.id,
                            to = %message.supplier_email,
                            attempts,
                            error = %err,
                            "Supplier email failed, will retry"
                        );
                    }

                    EmailResult {
                        supplier_email: message.supplier_email,
                        purchase_ids: message.purchase_ids,
                        status,
                        error: Some(err.to_string()),
                    }
                }
            };
            results.push(result);
        }

        results
    }

    /// Linear backoff, capped at one day
    fn backoff_secs(&self, attempts: i32) -> i64 {
        let interval = i64::try_from(self.retry_interval_secs).unwrap_or(MAX_BACKOFF_SECS);
        interval
            .saturating_mul(i64::from(attempts.max(1)))
            .min(MAX_BACKOFF_SECS)
    }

    /// Claim due pending emails and send them again. Returns how many were claimed.
    pub async fn retry_pending(&self) -> AppResult<usize> {
        let lease_until = Utc::now() + chrono::Duration::seconds(CLAIM_LEASE_SECS);

        let messages = sqlx::query_as::<_, OutboxMessage>(
            r#"
            UPDATE supplier_email_outbox
            SET next_attempt_at = $2, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM supplier_email_outbox
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, supplier_email, subject, html_body, purchase_ids, attempts
            "#,
        )
        .bind(self.retry_batch_size)
        .bind(lease_until)
        .fetch_all(&self.db)
        .await?;

        let claimed = messages.len();
        if claimed > 0 {
            let results = self.dispatch_outbox(messages).await;
            let sent = results
                .iter()
                .filter(|r| r.status == OutboxStatus::Sent)
                .count();
            tracing::info!(claimed, sent, "Retried pending supplier emails");
        }

        Ok(claimed)
    }
}

/// Run [`NotificationService::retry_pending`] on a fixed interval
pub fn spawn_retry_worker(
    service: NotificationService,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = service.retry_pending().await {
                tracing::error!(error = %err, "Supplier email retry sweep failed");
            }
        }
    })
}

/// Send every message and wait for all of them; one failure never stops the others
pub async fn deliver_all(
    mailer: &dyn EmailDispatcher,
    messages: &[OutboxMessage],
) -> Vec<Result<(), EmailError>> {
    join_all(
        messages
            .iter()
            .map(|m| mailer.send(&m.supplier_email, &m.subject, &m.html_body)),
    )
    .await
}

/// Split a joined row into the request and its email line, or the reason it cannot be sent
fn notify_item(row: NotifyRow) -> Result<(PurchaseRequest, NotifyItem), String> {
    let request = PurchaseRequest::try_from(row.request).map_err(|e| e.to_string())?;

    let po_number = request
        .po_number
        .clone()
        .ok_or_else(|| "No PO number has been assigned".to_string())?;
    let supplier_email = row
        .supplier_email
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| format!("Supplier {} has no email address", row.supplier_name))?;
    let (so_number, qty) = row
        .so_number
        .zip(row.qty)
        .ok_or_else(|| "The sales line no longer exists".to_string())?;

    let item = NotifyItem {
        purchase_id: request.id,
        po_number,
        so_number,
        product_id: request.product_id.clone(),
        product_name: row.product_name,
        qty,
        supplier_name: row.supplier_name,
        supplier_email,
    };
    Ok((request, item))
}

/// Group email lines by supplier address, ignoring case
pub fn group_by_supplier(items: Vec<NotifyItem>) -> BTreeMap<String, Vec<NotifyItem>> {
    let mut groups: BTreeMap<String, Vec<NotifyItem>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.supplier_email.trim().to_lowercase())
            .or_default()
            .push(item);
    }
    groups
}

pub fn confirmation_link(base_url: &str, supplier_email: &str, token: &str) -> String {
    format!(
        "{}/supplier-confirmation/{}?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(supplier_email),
        urlencoding::encode(token)
    )
}

/// HTML summary table of one supplier's requests
pub fn render_supplier_summary(supplier_name: &str, items: &[NotifyItem], link: &str) -> String {
    let mut rows = String::new();
    for item in items {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&item.po_number),
            escape_html(&item.so_number),
            escape_html(&item.product_id),
            escape_html(item.product_name.as_deref().unwrap_or("")),
            item.qty
        ));
    }

    format!(
        concat!(
            "<p>Dear {},</p>",
            "<p>Please confirm the following purchase orders.</p>",
            "<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">",
            "<thead><tr><th>PO Number</th><th>SO Number</th><th>Product</th>",
            "<th>Description</th><th>Qty</th></tr></thead>",
            "<tbody>{}</tbody></table>",
            "<p><a href=\"{}\">Confirm, decline or report a delay</a></p>"
        ),
        escape_html(supplier_name),
        rows,
        escape_html(link)
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
