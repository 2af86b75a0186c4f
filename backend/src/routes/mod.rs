//! Route definitions for the Furniture Order System

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Supplier confirmation (signed link, no staff session)
        .route(
            "/supplier-confirmation/:email",
            get(handlers::list_awaiting).post(handlers::submit_responses),
        )
        // Protected routes - sales orders
        .nest("/orders", order_routes(state.clone()))
        // Protected routes - purchase requests
        .nest("/purchase-requests", purchase_routes(state))
}

/// Sales order routes (protected)
fn order_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_order))
        .route(
            "/:so_number",
            get(handlers::get_order).put(handlers::update_order),
        )
        .route(
            "/:so_number/items/:product_code",
            delete(handlers::delete_line_item),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Purchase request routes (protected)
fn purchase_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/po-numbers", post(handlers::assign_po_numbers))
        .route("/notify", post(handlers::notify_suppliers))
        .route("/:purchase_id/status", put(handlers::update_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
