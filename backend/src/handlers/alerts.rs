//! HTTP handlers for stock alerts and summaries

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::services::alerting::{AlertFilter, CategorySummary, ExpiryAlert, StockAlert};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub within_days: Option<i64>,
}

/// Items at or below their minimum
pub async fn list_low_stock(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<Vec<StockAlert>>> {
    let alerts = state.alerts().low_stock_items(&filter).await?;
    Ok(Json(alerts))
}

/// Items expiring within the window
pub async fn list_expiring(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<ExpiryAlert>>> {
    let alerts = state.alerts().expiring_soon(query.within_days).await?;
    Ok(Json(alerts))
}

/// Items past their expiration date
pub async fn list_expired(State(state): State<AppState>) -> AppResult<Json<Vec<ExpiryAlert>>> {
    let alerts = state.alerts().expired_items().await?;
    Ok(Json(alerts))
}

/// Per-category stock summary
pub async fn get_summary(State(state): State<AppState>) -> AppResult<Json<Vec<CategorySummary>>> {
    let summary = state.alerts().summary().await?;
    Ok(Json(summary))
}
