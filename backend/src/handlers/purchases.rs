//! Purchase request HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use shared::{FULFILMENT, PURCHASING};

use crate::middleware::{require_role, CurrentUser};
use crate::services::notification::{NotificationService, SendEmailsOutcome};
use crate::services::purchase::{PurchaseLifecycleService, PurchaseSelection, StatusChangeInput};
use crate::AppState;

/// Query parameters for supplier notification
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyParams {
    #[serde(default)]
    pub send_anyway: bool,
}

/// Assign PO numbers to the selected purchase requests
pub async fn assign_po_numbers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<PurchaseSelection>,
) -> impl IntoResponse {
    if let Err(e) = require_role(&user, PURCHASING) {
        return e.into_response();
    }

    let service = PurchaseLifecycleService::new(state.db.clone());

    match service
        .assign_po_numbers(&input.purchase_ids, &user.username)
        .await
    {
        Ok(requests) => (
            StatusCode::OK,
            Json(json!({ "purchaseRequests": requests })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Email the suppliers of the selected purchase requests
pub async fn notify_suppliers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<NotifyParams>,
    Json(input): Json<PurchaseSelection>,
) -> impl IntoResponse {
    if let Err(e) = require_role(&user, PURCHASING) {
        return e.into_response();
    }

    let service = NotificationService::new(state.db.clone(), state.mailer.clone(), &state.config);

    match service
        .send_supplier_emails(&input.purchase_ids, params.send_anyway, &user.username)
        .await
    {
        Ok(SendEmailsOutcome::InsufficientPayment { shortfalls }) => (
            StatusCode::OK,
            Json(json!({
                "insufficientPayment": true,
                "message": "Some orders are below the required paid ratio; resend with sendAnyway=true to notify anyway",
                "shortfalls": shortfalls,
            })),
        )
            .into_response(),
        Ok(SendEmailsOutcome::Dispatched(report)) => (
            StatusCode::OK,
            Json(json!({
                "insufficientPayment": false,
                "batchId": report.batch_id,
                "notified": report.notified,
                "failedLookups": report.failed_lookups,
                "emails": report.emails,
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Record a receiving or delivery outcome
pub async fn update_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(purchase_id): Path<i64>,
    Json(input): Json<StatusChangeInput>,
) -> impl IntoResponse {
    if let Err(e) = require_role(&user, FULFILMENT) {
        return e.into_response();
    }

    let service = PurchaseLifecycleService::new(state.db.clone());

    match service.apply_status(purchase_id, input, &user.username).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => e.into_response(),
    }
}
