//! Sales order HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use shared::{CreateOrderInput, UpdateOrderInput, ORDER_WRITERS};

use crate::middleware::{require_role, CurrentUser};
use crate::services::order::{CreateOrderOutcome, OrderService};
use crate::AppState;

/// Create a sales order
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> impl IntoResponse {
    if let Err(e) = require_role(&user, ORDER_WRITERS) {
        return e.into_response();
    }

    let service = OrderService::new(state.db.clone());

    match service.create_order(input, &user.username).await {
        Ok(CreateOrderOutcome::Created {
            so_number,
            lines,
            purchase_requests,
        }) => (
            StatusCode::CREATED,
            Json(json!({
                "soNumber": so_number,
                "purchaseRequestsCreated": true,
                "lines": lines,
                "purchaseRequests": purchase_requests,
            })),
        )
            .into_response(),
        Ok(CreateOrderOutcome::CreatedWithoutPurchaseRequests { so_number, lines }) => (
            StatusCode::CREATED,
            Json(json!({
                "soNumber": so_number,
                "purchaseRequestsCreated": false,
                "message": "All items are in stock; no purchase requests were needed",
                "lines": lines,
                "purchaseRequests": [],
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a sales order with its lines and purchase requests
pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(so_number): Path<String>,
) -> impl IntoResponse {
    let service = OrderService::new(state.db.clone());

    match service.get_order(&so_number).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Update a sales order: add new lines and rewrite shared fields
pub async fn update_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(so_number): Path<String>,
    Json(input): Json<UpdateOrderInput>,
) -> impl IntoResponse {
    if let Err(e) = require_role(&user, ORDER_WRITERS) {
        return e.into_response();
    }

    let service = OrderService::new(state.db.clone());

    match service.update_order(&so_number, input, &user.username).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Delete one product line from a sales order
pub async fn delete_line_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((so_number, product_code)): Path<(String, String)>,
) -> impl IntoResponse {
    if let Err(e) = require_role(&user, ORDER_WRITERS) {
        return e.into_response();
    }

    let service = OrderService::new(state.db.clone());

    match service
        .delete_line_item(&so_number, &product_code, &user.username)
        .await
    {
        Ok(deleted) => (StatusCode::OK, Json(deleted)).into_response(),
        Err(e) => e.into_response(),
    }
}
