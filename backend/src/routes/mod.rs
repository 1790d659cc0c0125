//! Route definitions for the inventory ledger API

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/stock-items", stock_item_routes())
        .nest("/movements", movement_routes())
        .route("/consumer-lines/deduct", post(handlers::deduct_consumer_lines))
        .nest("/alerts", alert_routes())
}

/// Stock item catalog and per-item ledger routes
fn stock_item_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_stock_items).post(handlers::create_stock_item),
        )
        .route("/lookup", get(handlers::lookup_stock_item))
        .route(
            "/:item_id",
            get(handlers::get_stock_item).put(handlers::update_stock_item),
        )
        .route("/:item_id/movements", get(handlers::list_item_movements))
        .route(
            "/:item_id/movements/export",
            get(handlers::export_item_movements),
        )
        .route("/:item_id/ledger-check", get(handlers::check_item_ledger))
        .route("/:item_id/dispense", post(handlers::dispense_stock))
        .route("/:item_id/receive", post(handlers::receive_stock))
        .route("/:item_id/adjust", post(handlers::adjust_stock))
        .route("/:item_id/transfer", post(handlers::transfer_stock))
}

/// Movement routes
fn movement_routes() -> Router<AppState> {
    Router::new()
        .route("/:movement_id", get(handlers::get_movement))
        .route("/:movement_id/reverse", post(handlers::reverse_movement))
}

/// Alert routes
fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/low-stock", get(handlers::list_low_stock))
        .route("/expiring", get(handlers::list_expiring))
        .route("/expired", get(handlers::list_expired))
        .route("/summary", get(handlers::get_summary))
}
