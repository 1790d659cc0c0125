//! Persistence for stock items and the movement ledger
//!
//! Two tables: `stock_items` (one row per item, `current_quantity` mutable) and
//! `stock_movements` (append-only). Services talk to them through
//! [`StockRepository`] so the same ledger rules run against PostgreSQL in
//! production and against the in-memory store in tests and demos.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    MovementReason, MovementReference, MovementType, StockItem, StockItemFilter, StockMovement,
    TimeRange,
};
use uuid::Uuid;

use crate::config::{Config, StorageBackend};
use crate::error::{AppError, AppResult};

mod memory;
mod postgres;

pub use memory::MemoryStockRepository;
pub use postgres::PgStockRepository;

/// A movement that has been validated but not yet committed
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub id: Uuid,
    pub stock_item_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    /// Balance the movement was validated against; the commit fails with
    /// `Busy` if the stored balance no longer matches
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reason: MovementReason,
    pub reference: Option<MovementReference>,
    pub idempotency_key: Option<String>,
    pub reversal_of: Option<Uuid>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub performed_by: String,
    pub occurred_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewMovement {
    pub fn into_movement(self, sequence: i64) -> StockMovement {
        StockMovement {
            id: self.id,
            sequence,
            stock_item_id: self.stock_item_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            reason: self.reason,
            reference: self.reference,
            idempotency_key: self.idempotency_key,
            reversal_of: self.reversal_of,
            from_location: self.from_location,
            to_location: self.to_location,
            performed_by: self.performed_by,
            occurred_at: self.occurred_at,
            notes: self.notes,
        }
    }

    /// Location the item ends up at after this movement, for transfers
    pub fn new_location(&self) -> Option<&str> {
        match self.movement_type {
            MovementType::Transfer => self.to_location.as_deref(),
            _ => None,
        }
    }
}

/// Storage operations used by the ledger services.
///
/// `commit_movement` is the only way `current_quantity` changes after
/// creation; implementations apply the movement row and the balance write as
/// one atomic unit.
#[async_trait]
pub trait StockRepository: Send + Sync + 'static {
    /// Insert a catalog entry together with its initial stocking movement
    async fn insert_item(
        &self,
        item: &StockItem,
        initial: Option<NewMovement>,
    ) -> AppResult<(StockItem, Option<StockMovement>)>;

    /// Persist descriptive fields; the stored balance is left untouched
    async fn update_item(&self, item: &StockItem) -> AppResult<StockItem>;

    async fn get_item(&self, id: Uuid) -> AppResult<Option<StockItem>>;

    async fn list_items(&self, filter: &StockItemFilter) -> AppResult<Vec<StockItem>>;

    /// Case-insensitive exact match over active items
    async fn find_item_by_name(&self, name: &str) -> AppResult<Option<StockItem>>;

    /// Append the movement and write its resulting balance atomically
    async fn commit_movement(&self, movement: NewMovement) -> AppResult<(StockMovement, StockItem)>;

    async fn get_movement(&self, id: Uuid) -> AppResult<Option<StockMovement>>;

    async fn find_movement_by_key(&self, idempotency_key: &str) -> AppResult<Option<StockMovement>>;

    /// Movements of one item in commit order, strictly after `after_sequence`
    async fn list_movements(
        &self,
        stock_item_id: Uuid,
        range: &TimeRange,
        after_sequence: Option<i64>,
        limit: u32,
    ) -> AppResult<Vec<StockMovement>>;

    async fn ping(&self) -> AppResult<()>;
}

/// Build the repository selected by configuration
pub async fn connect(config: &Config) -> AppResult<Arc<dyn StockRepository>> {
    match config.inventory.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory stock repository; data is not persisted");
            Ok(Arc::new(MemoryStockRepository::new()))
        }
        StorageBackend::Postgres => {
            if config.database.url.is_empty() {
                return Err(AppError::Configuration(
                    "database.url is not set".to_string(),
                ));
            }
            let repo = PgStockRepository::connect(config).await?;
            // Run migrations in development
            if config.environment == "development" {
                repo.migrate().await?;
            }
            Ok(Arc::new(repo))
        }
    }
}
