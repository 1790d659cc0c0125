//! HTTP handlers for the stock item catalog

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{
    CreateStockItemInput, StockCategory, StockItem, StockItemFilter, StockStatus,
    UpdateStockItemInput,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Catalog entry with its derived stock status
#[derive(Debug, Serialize)]
pub struct StockItemView {
    #[serde(flatten)]
    pub item: StockItem,
    pub status: StockStatus,
}

impl From<StockItem> for StockItemView {
    fn from(item: StockItem) -> Self {
        Self {
            status: item.status(),
            item,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListStockItemsQuery {
    pub category: Option<StockCategory>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub name: String,
}

/// List stock items
pub async fn list_stock_items(
    State(state): State<AppState>,
    Query(query): Query<ListStockItemsQuery>,
) -> AppResult<Json<Vec<StockItemView>>> {
    let filter = StockItemFilter {
        category: query.category,
        active: query.active,
        search: query.search,
    };
    let items = state.stock_items().list(&filter).await?;
    Ok(Json(items.into_iter().map(StockItemView::from).collect()))
}

/// Create a stock item
pub async fn create_stock_item(
    State(state): State<AppState>,
    Json(input): Json<CreateStockItemInput>,
) -> AppResult<(StatusCode, Json<StockItemView>)> {
    let item = state.stock_items().create(input).await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// Get a stock item by ID
pub async fn get_stock_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<StockItemView>> {
    let item = state.stock_items().get(item_id).await?;
    Ok(Json(item.into()))
}

/// Update descriptive fields of a stock item
pub async fn update_stock_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateStockItemInput>,
) -> AppResult<Json<StockItemView>> {
    let item = state.stock_items().update(item_id, input).await?;
    Ok(Json(item.into()))
}

/// Resolve a product name to an active stock item
pub async fn lookup_stock_item(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<StockItemView>> {
    let item = state
        .stock_items()
        .find_by_name(&query.name)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;
    Ok(Json(item.into()))
}
