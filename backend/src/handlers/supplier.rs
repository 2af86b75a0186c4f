//! Supplier confirmation HTTP handlers
//!
//! Not behind the staff JWT; the signed link token identifies the supplier.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use shared::SupplierResponse;

use crate::services::supplier_confirmation::SupplierConfirmationService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LinkParams {
    pub token: Option<String>,
}

fn service(state: &AppState) -> SupplierConfirmationService {
    SupplierConfirmationService::new(
        state.db.clone(),
        state.config.supplier_portal.link_secret.clone(),
    )
}

/// List the supplier's purchase requests waiting for an answer
pub async fn list_awaiting(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(params): Query<LinkParams>,
) -> impl IntoResponse {
    let service = service(&state);
    if let Err(e) = service.authorize(&email, params.token.as_deref()) {
        return e.into_response();
    }

    match service.list_awaiting(&email).await {
        Ok(requests) => (
            StatusCode::OK,
            Json(json!({ "supplierEmail": email, "purchaseRequests": requests })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Apply the supplier's answers, keyed by purchase request id
pub async fn submit_responses(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(params): Query<LinkParams>,
    Json(responses): Json<BTreeMap<String, SupplierResponse>>,
) -> impl IntoResponse {
    let service = service(&state);
    if let Err(e) = service.authorize(&email, params.token.as_deref()) {
        return e.into_response();
    }

    match service.apply_responses(&email, responses).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}
