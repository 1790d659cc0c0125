//! HTTP handlers for stock movements and consumer deductions

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ConsumerLine, Page, PageLimit, StockMovement, TimeRange};
use uuid::Uuid;

use crate::error::{AppResult, ErrorDetail};
use crate::services::gateway::{
    AdjustInput, LineDeduction, MovementOutcome, QuantityChangeInput, ReverseInput, TransferInput,
};
use crate::services::ledger::LedgerCheck;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Sequence cursor returned as `next_cursor` by the previous page
    pub after: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct DeductLinesRequest {
    pub performed_by: String,
    pub lines: Vec<ConsumerLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineResult {
    Ok(LineDeduction),
    Error(ErrorDetail),
}

/// 201 for a new movement, 200 when an earlier one was replayed
fn outcome_response(outcome: MovementOutcome) -> (StatusCode, Json<MovementOutcome>) {
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (status, Json(outcome))
}

/// Get movement history for a stock item
pub async fn list_item_movements(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Page<StockMovement>>> {
    // 404 for unknown items rather than an empty page
    state.stock_items().get(item_id).await?;

    let range = TimeRange {
        from: query.from,
        to: query.to,
    };
    let page = state
        .ledger()
        .page(item_id, &range, query.after, PageLimit::new(query.limit))
        .await?;
    Ok(Json(page))
}

/// Export movement history for a stock item as CSV
pub async fn export_item_movements(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(query): Query<RangeQuery>,
) -> AppResult<impl IntoResponse> {
    state.stock_items().get(item_id).await?;

    let range = TimeRange {
        from: query.from,
        to: query.to,
    };
    let csv = state.ledger().export_csv(item_id, range).await?;
    let disposition = format!("attachment; filename=\"stock_movements_{}.csv\"", item_id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// Replay the ledger of a stock item and compare with its balance
pub async fn check_item_ledger(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<LedgerCheck>> {
    let check = state.ledger().verify(item_id).await?;
    Ok(Json(check))
}

/// Dispense stock
pub async fn dispense_stock(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<QuantityChangeInput>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let outcome = state.gateway().dispense(item_id, input).await?;
    Ok(outcome_response(outcome))
}

/// Receive stock
pub async fn receive_stock(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<QuantityChangeInput>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let outcome = state.gateway().receive(item_id, input).await?;
    Ok(outcome_response(outcome))
}

/// Record a physical recount
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<AdjustInput>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let outcome = state.gateway().adjust(item_id, input).await?;
    Ok(outcome_response(outcome))
}

/// Move a stock item to another location
pub async fn transfer_stock(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<TransferInput>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let outcome = state.gateway().transfer(item_id, input).await?;
    Ok(outcome_response(outcome))
}

/// Get a movement by ID
pub async fn get_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> AppResult<Json<StockMovement>> {
    let movement = state.ledger().get(movement_id).await?;
    Ok(Json(movement))
}

/// Reverse an in or out movement
pub async fn reverse_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
    Json(input): Json<ReverseInput>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let outcome = state.gateway().reverse(movement_id, input).await?;
    Ok(outcome_response(outcome))
}

/// Deduct the lines of a prescription or treatment.
///
/// Each line is processed independently; a failing line is reported in its
/// slot and does not stop the others.
pub async fn deduct_consumer_lines(
    State(state): State<AppState>,
    Json(request): Json<DeductLinesRequest>,
) -> AppResult<Json<Vec<LineResult>>> {
    let gateway = state.gateway();
    let mut results = Vec::with_capacity(request.lines.len());

    for line in request.lines {
        let result = match gateway.deduct_line(line, &request.performed_by).await {
            Ok(deduction) => LineResult::Ok(deduction),
            Err(e) => {
                tracing::warn!(error = %e, "Consumer line not deducted");
                LineResult::Error(e.detail())
            }
        };
        results.push(result);
    }

    Ok(Json(results))
}
