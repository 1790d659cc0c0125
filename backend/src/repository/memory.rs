//! Process-local repository backed by a single `RwLock`.
//!
//! A commit runs entirely inside one write-lock critical section with no await
//! point between the balance check and the writes, so it is atomic with respect
//! to other commits and to cancellation.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::{normalize_name, StockItem, StockItemFilter, StockMovement, TimeRange};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewMovement, StockRepository};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct MemoryState {
    items: HashMap<Uuid, StockItem>,
    /// All movements in commit order
    movements: Vec<StockMovement>,
    by_id: HashMap<Uuid, usize>,
    by_item: HashMap<Uuid, Vec<usize>>,
    by_key: HashMap<String, usize>,
    last_sequence: i64,
}

impl MemoryState {
    fn name_taken(&self, item: &StockItem) -> bool {
        if !item.active {
            return false;
        }
        let key = item.name_key();
        self.items
            .values()
            .any(|other| other.id != item.id && other.active && other.name_key() == key)
    }

    fn append(&mut self, movement: NewMovement) -> AppResult<StockMovement> {
        if let Some(key) = &movement.idempotency_key {
            if self.by_key.contains_key(key) {
                return Err(AppError::DuplicateEntry("idempotency_key".to_string()));
            }
        }

        self.last_sequence += 1;
        let movement = movement.into_movement(self.last_sequence);
        let index = self.movements.len();

        self.by_id.insert(movement.id, index);
        self.by_item
            .entry(movement.stock_item_id)
            .or_default()
            .push(index);
        if let Some(key) = &movement.idempotency_key {
            self.by_key.insert(key.clone(), index);
        }
        self.movements.push(movement.clone());

        Ok(movement)
    }
}

/// In-memory [`StockRepository`]
#[derive(Default)]
pub struct MemoryStockRepository {
    state: RwLock<MemoryState>,
}

impl MemoryStockRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockRepository for MemoryStockRepository {
    async fn insert_item(
        &self,
        item: &StockItem,
        initial: Option<NewMovement>,
    ) -> AppResult<(StockItem, Option<StockMovement>)> {
        let mut state = self.state.write().await;

        if state.items.contains_key(&item.id) {
            return Err(AppError::DuplicateEntry("id".to_string()));
        }
        if state.name_taken(item) {
            return Err(AppError::DuplicateEntry("name".to_string()));
        }

        state.items.insert(item.id, item.clone());
        let movement = match initial {
            Some(movement) => Some(state.append(movement)?),
            None => None,
        };

        Ok((item.clone(), movement))
    }

    async fn update_item(&self, item: &StockItem) -> AppResult<StockItem> {
        let mut state = self.state.write().await;

        if state.name_taken(item) {
            return Err(AppError::DuplicateEntry("name".to_string()));
        }

        let stored = state
            .items
            .get_mut(&item.id)
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;

        let balance = stored.current_quantity;
        *stored = StockItem {
            current_quantity: balance,
            created_at: stored.created_at,
            ..item.clone()
        };

        Ok(stored.clone())
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<StockItem>> {
        Ok(self.state.read().await.items.get(&id).cloned())
    }

    async fn list_items(&self, filter: &StockItemFilter) -> AppResult<Vec<StockItem>> {
        let state = self.state.read().await;
        let mut items: Vec<StockItem> = state
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name_key().cmp(&b.name_key()).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn find_item_by_name(&self, name: &str) -> AppResult<Option<StockItem>> {
        let key = normalize_name(name);
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .find(|item| item.active && item.name_key() == key)
            .cloned())
    }

    async fn commit_movement(&self, movement: NewMovement) -> AppResult<(StockMovement, StockItem)> {
        let mut state = self.state.write().await;

        let stored = state
            .items
            .get(&movement.stock_item_id)
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;
        if stored.current_quantity != movement.balance_before {
            return Err(AppError::Busy(format!(
                "balance of {} changed from {} to {} before commit",
                movement.stock_item_id, movement.balance_before, stored.current_quantity
            )));
        }
        if let Some(key) = &movement.idempotency_key {
            if state.by_key.contains_key(key) {
                return Err(AppError::DuplicateEntry("idempotency_key".to_string()));
            }
        }

        let item_id = movement.stock_item_id;
        let balance_after = movement.balance_after;
        let new_location = movement.new_location().map(str::to_string);
        let occurred_at = movement.occurred_at;

        let committed = state.append(movement)?;

        let item = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;
        item.current_quantity = balance_after;
        if let Some(location) = new_location {
            item.location = Some(location);
        }
        item.updated_at = occurred_at;

        Ok((committed, item.clone()))
    }

    async fn get_movement(&self, id: Uuid) -> AppResult<Option<StockMovement>> {
        let state = self.state.read().await;
        Ok(state.by_id.get(&id).map(|&i| state.movements[i].clone()))
    }

    async fn find_movement_by_key(&self, idempotency_key: &str) -> AppResult<Option<StockMovement>> {
        let state = self.state.read().await;
        Ok(state
            .by_key
            .get(idempotency_key)
            .map(|&i| state.movements[i].clone()))
    }

    async fn list_movements(
        &self,
        stock_item_id: Uuid,
        range: &TimeRange,
        after_sequence: Option<i64>,
        limit: u32,
    ) -> AppResult<Vec<StockMovement>> {
        let state = self.state.read().await;
        let Some(indexes) = state.by_item.get(&stock_item_id) else {
            return Ok(Vec::new());
        };

        Ok(indexes
            .iter()
            .map(|&i| &state.movements[i])
            .filter(|m| after_sequence.map_or(true, |after| m.sequence > after))
            .filter(|m| range.contains(m.occurred_at))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
