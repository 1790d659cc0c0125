//! Stock item catalog service

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use shared::{
    validate_item, validate_new_item, CreateStockItemInput, MovementReason, MovementType,
    StockItem, StockItemFilter, UpdateStockItemInput,
};
use uuid::Uuid;
use validator::Validate;

use super::locks::ItemLocks;
use crate::error::{AppError, AppResult};
use crate::repository::{NewMovement, StockRepository};

/// Operator recorded on initial stocking when the caller does not name one
const SYSTEM_ACTOR: &str = "system";

/// Authoritative CRUD over catalog entries.
///
/// Balances are never written here after creation: quantity changes go through
/// the deduction gateway so that every change has a ledger entry. Updates
/// take the same per-item lock as the gateway.
#[derive(Clone)]
pub struct StockItemStore {
    repo: Arc<dyn StockRepository>,
    locks: Arc<ItemLocks>,
    lock_timeout: Duration,
}

impl StockItemStore {
    /// Create a new StockItemStore instance
    pub fn new(repo: Arc<dyn StockRepository>, locks: Arc<ItemLocks>, lock_timeout: Duration) -> Self {
        Self {
            repo,
            locks,
            lock_timeout,
        }
    }

    /// Create a catalog entry, recording its starting balance as an `in` movement
    pub async fn create(&self, input: CreateStockItemInput) -> AppResult<StockItem> {
        validate_new_item(&input)?;

        let now = Utc::now();
        let item = StockItem {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            category: input.category,
            unit: input.unit,
            current_quantity: input.current_quantity,
            minimum_quantity: input.minimum_quantity,
            maximum_quantity: input.maximum_quantity,
            unit_cost: input.unit_cost,
            selling_price: input.selling_price,
            batch_number: input.batch_number,
            expiration_date: input.expiration_date,
            supplier: input.supplier,
            location: input.location,
            active: true,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };

        let initial = (item.current_quantity > Decimal::ZERO).then(|| NewMovement {
            id: Uuid::new_v4(),
            stock_item_id: item.id,
            movement_type: MovementType::In,
            quantity: item.current_quantity,
            balance_before: Decimal::ZERO,
            balance_after: item.current_quantity,
            reason: MovementReason::InitialStock,
            reference: None,
            idempotency_key: None,
            reversal_of: None,
            from_location: None,
            to_location: item.location.clone(),
            performed_by: input
                .performed_by
                .filter(|actor| !actor.trim().is_empty())
                .unwrap_or_else(|| SYSTEM_ACTOR.to_string()),
            occurred_at: now,
            notes: None,
        });

        let (item, _) = self.repo.insert_item(&item, initial).await?;

        tracing::info!(
            item_id = %item.id,
            name = %item.name,
            quantity = %item.current_quantity,
            "Stock item created"
        );

        Ok(item)
    }

    /// Update descriptive fields of a catalog entry
    pub async fn update(&self, id: Uuid, patch: UpdateStockItemInput) -> AppResult<StockItem> {
        if patch.current_quantity.is_some() {
            return Err(AppError::validation(
                "current_quantity",
                "Quantity cannot be edited directly; record an adjustment instead",
            ));
        }
        patch.validate()?;

        // A transfer or deactivation must not land between the read and the write
        let _guard = self.locks.acquire(id, self.lock_timeout).await?;
        let mut item = self.get(id).await?;

        if let Some(name) = patch.name {
            item.name = name.trim().to_string();
        }
        if let Some(category) = patch.category {
            item.category = category;
        }
        if let Some(unit) = patch.unit {
            item.unit = unit;
        }
        if let Some(minimum) = patch.minimum_quantity {
            item.minimum_quantity = minimum;
        }
        if let Some(maximum) = patch.maximum_quantity {
            item.maximum_quantity = maximum;
        }
        if let Some(unit_cost) = patch.unit_cost {
            item.unit_cost = unit_cost;
        }
        if let Some(selling_price) = patch.selling_price {
            item.selling_price = selling_price;
        }
        if let Some(batch_number) = patch.batch_number {
            item.batch_number = Some(batch_number);
        }
        if let Some(expiration_date) = patch.expiration_date {
            item.expiration_date = expiration_date;
        }
        if let Some(supplier) = patch.supplier {
            item.supplier = Some(supplier);
        }
        if let Some(location) = patch.location {
            item.location = Some(location);
        }
        if let Some(active) = patch.active {
            item.active = active;
        }
        if let Some(notes) = patch.notes {
            item.notes = Some(notes);
        }

        validate_item(&item)?;
        item.updated_at = Utc::now();

        let item = self.repo.update_item(&item).await?;
        tracing::info!(item_id = %item.id, active = item.active, "Stock item updated");

        Ok(item)
    }

    /// Get a catalog entry by id
    pub async fn get(&self, id: Uuid) -> AppResult<StockItem> {
        self.repo
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))
    }

    /// List catalog entries, ordered by name
    pub async fn list(&self, filter: &StockItemFilter) -> AppResult<Vec<StockItem>> {
        self.repo.list_items(filter).await
    }

    /// Resolve a free-text product name to an active catalog entry
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<StockItem>> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        self.repo.find_item_by_name(name).await
    }
}
