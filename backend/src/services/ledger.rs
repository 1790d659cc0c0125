//! Append-only movement ledger

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    reconciler, validate_actor, MovementReason, MovementReference, MovementType, Page, PageLimit,
    StockItem, StockMovement, TimeRange,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::repository::{NewMovement, StockRepository};

/// A movement request before it has been checked against the balance
#[derive(Debug, Clone)]
pub struct MovementDraft {
    pub stock_item_id: Uuid,
    pub movement_type: MovementType,
    /// Magnitude for in/out, target balance for adjustments; ignored for transfers
    pub quantity: Decimal,
    pub reason: MovementReason,
    pub reference: Option<MovementReference>,
    pub idempotency_key: Option<String>,
    pub reversal_of: Option<Uuid>,
    pub to_location: Option<String>,
    pub performed_by: String,
    pub notes: Option<String>,
}

/// Result of replaying an item's ledger against its stored balance
#[derive(Debug, Clone, Serialize)]
pub struct LedgerCheck {
    pub stock_item_id: Uuid,
    pub recorded_balance: Decimal,
    pub replayed_balance: Decimal,
    pub movement_count: usize,
    /// First movement whose `balance_before` does not match its predecessor
    pub first_gap: Option<Uuid>,
    pub consistent: bool,
}

#[derive(Serialize)]
struct MovementCsvRow<'a> {
    sequence: i64,
    occurred_at: DateTime<Utc>,
    movement_id: Uuid,
    movement_type: &'a str,
    reason: &'a str,
    quantity: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    reference: Option<String>,
    from_location: Option<&'a str>,
    to_location: Option<&'a str>,
    performed_by: &'a str,
    notes: Option<&'a str>,
}

impl<'a> From<&'a StockMovement> for MovementCsvRow<'a> {
    fn from(m: &'a StockMovement) -> Self {
        Self {
            sequence: m.sequence,
            occurred_at: m.occurred_at,
            movement_id: m.id,
            movement_type: m.movement_type.as_str(),
            reason: m.reason.as_str(),
            quantity: m.quantity,
            balance_before: m.balance_before,
            balance_after: m.balance_after,
            reference: m.reference.as_ref().map(|r| r.to_string()),
            from_location: m.from_location.as_deref(),
            to_location: m.to_location.as_deref(),
            performed_by: &m.performed_by,
            notes: m.notes.as_deref(),
        }
    }
}

/// Ledger service: validates drafts against the current balance and commits
/// them together with the new balance
#[derive(Clone)]
pub struct MovementLedger {
    repo: Arc<dyn StockRepository>,
    page_size: u32,
}

impl MovementLedger {
    pub fn new(repo: Arc<dyn StockRepository>, page_size: u32) -> Self {
        Self {
            repo,
            page_size: PageLimit::new(Some(page_size)).get(),
        }
    }

    /// Append a movement, loading the item it applies to
    pub async fn append(&self, draft: MovementDraft) -> AppResult<(StockMovement, StockItem)> {
        let item = self
            .repo
            .get_item(draft.stock_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;
        self.append_to(&item, draft).await
    }

    /// Append a movement against an already loaded item.
    ///
    /// The commit fails with `Busy` if the stored balance moved since `item`
    /// was read.
    pub async fn append_to(
        &self,
        item: &StockItem,
        draft: MovementDraft,
    ) -> AppResult<(StockMovement, StockItem)> {
        validate_actor(&draft.performed_by)
            .map_err(|msg| AppError::validation("performed_by", msg))?;

        let balance_before = item.current_quantity;
        let (quantity, from_location, to_location) = match draft.movement_type {
            MovementType::Transfer => {
                let to_location = draft
                    .to_location
                    .filter(|loc| !loc.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::validation("to_location", "Destination location is required")
                    })?;
                (balance_before, item.location.clone(), Some(to_location))
            }
            _ => (draft.quantity, None, draft.to_location),
        };

        let balance_after = reconciler::apply_movement(balance_before, draft.movement_type, quantity)
            .map_err(|e| AppError::from_balance(item.id, e))?;

        let movement = NewMovement {
            id: Uuid::new_v4(),
            stock_item_id: item.id,
            movement_type: draft.movement_type,
            quantity,
            balance_before,
            balance_after,
            reason: draft.reason,
            reference: draft.reference,
            idempotency_key: draft.idempotency_key,
            reversal_of: draft.reversal_of,
            from_location,
            to_location,
            performed_by: draft.performed_by.trim().to_string(),
            occurred_at: Utc::now(),
            notes: draft.notes,
        };

        let (movement, item) = self.repo.commit_movement(movement).await?;

        tracing::info!(
            item_id = %item.id,
            movement_id = %movement.id,
            movement_type = movement.movement_type.as_str(),
            quantity = %movement.quantity,
            balance_after = %movement.balance_after,
            "Stock movement recorded"
        );

        Ok((movement, item))
    }

    /// Get a movement by id
    pub async fn get(&self, id: Uuid) -> AppResult<StockMovement> {
        self.repo
            .get_movement(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock movement".to_string()))
    }

    /// Lazily paged history of one item, oldest first
    pub fn list_by_item(&self, stock_item_id: Uuid, range: TimeRange) -> MovementHistory {
        MovementHistory {
            repo: self.repo.clone(),
            stock_item_id,
            range,
            page_size: self.page_size,
            cursor: None,
            exhausted: false,
        }
    }

    /// One page of history after `after_sequence`, for cursor-based APIs
    pub async fn page(
        &self,
        stock_item_id: Uuid,
        range: &TimeRange,
        after_sequence: Option<i64>,
        limit: PageLimit,
    ) -> AppResult<Page<StockMovement>> {
        let data = self
            .repo
            .list_movements(stock_item_id, range, after_sequence, limit.get())
            .await?;
        let next_cursor = if data.len() as u32 == limit.get() {
            data.last().map(|m| m.sequence)
        } else {
            None
        };
        Ok(Page { data, next_cursor })
    }

    /// Replay the item's full ledger and compare it with the stored balance
    pub async fn verify(&self, stock_item_id: Uuid) -> AppResult<LedgerCheck> {
        let item = self
            .repo
            .get_item(stock_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;

        let movements = self
            .list_by_item(stock_item_id, TimeRange::all())
            .collect_all()
            .await?;

        let replayed_balance = reconciler::replay(&movements)
            .map_err(|e| AppError::Internal(format!("ledger of {} cannot be replayed: {}", stock_item_id, e)))?;

        let mut expected = Decimal::ZERO;
        let mut first_gap = None;
        for movement in &movements {
            if movement.balance_before != expected && first_gap.is_none() {
                first_gap = Some(movement.id);
            }
            expected = movement.balance_after;
        }

        let consistent = first_gap.is_none() && replayed_balance == item.current_quantity;
        if !consistent {
            tracing::error!(
                item_id = %stock_item_id,
                recorded = %item.current_quantity,
                replayed = %replayed_balance,
                "Stock ledger does not reconcile"
            );
        }

        Ok(LedgerCheck {
            stock_item_id,
            recorded_balance: item.current_quantity,
            replayed_balance,
            movement_count: movements.len(),
            first_gap,
            consistent,
        })
    }

    /// Export an item's history in a range as CSV
    pub async fn export_csv(&self, stock_item_id: Uuid, range: TimeRange) -> AppResult<String> {
        let movements = self.list_by_item(stock_item_id, range).collect_all().await?;

        let mut wtr = csv::Writer::from_writer(vec![]);
        for movement in &movements {
            wtr.serialize(MovementCsvRow::from(movement))
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

/// Restartable, finite cursor over an item's movements in commit order.
///
/// Pages are fetched on demand; dropping the history part-way leaves nothing
/// behind.
pub struct MovementHistory {
    repo: Arc<dyn StockRepository>,
    stock_item_id: Uuid,
    range: TimeRange,
    page_size: u32,
    cursor: Option<i64>,
    exhausted: bool,
}

impl MovementHistory {
    /// Fetch the next page, or `None` once the history is exhausted
    pub async fn next_page(&mut self) -> AppResult<Option<Vec<StockMovement>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .repo
            .list_movements(self.stock_item_id, &self.range, self.cursor, self.page_size)
            .await?;

        if (page.len() as u32) < self.page_size {
            self.exhausted = true;
        }
        match page.last() {
            Some(last) => {
                self.cursor = Some(last.sequence);
                Ok(Some(page))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Start again from the oldest movement
    pub fn restart(&mut self) {
        self.cursor = None;
        self.exhausted = false;
    }

    pub async fn collect_all(mut self) -> AppResult<Vec<StockMovement>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStockRepository;
    use shared::{CreateStockItemInput, StockCategory, StockUnit};

    use crate::services::{ItemLocks, StockItemStore};
    use std::time::Duration;

    async fn seeded(quantity: i64) -> (Arc<dyn StockRepository>, StockItem) {
        let repo: Arc<dyn StockRepository> = Arc::new(MemoryStockRepository::new());
        let locks = Arc::new(ItemLocks::new());
        let item = StockItemStore::new(repo.clone(), locks, Duration::from_secs(1))
            .create(CreateStockItemInput {
                name: "Meloxicam 1.5mg/ml".to_string(),
                category: StockCategory::Medication,
                unit: StockUnit::Bottle,
                current_quantity: Decimal::from(quantity),
                minimum_quantity: Decimal::from(2),
                maximum_quantity: None,
                unit_cost: Decimal::ZERO,
                selling_price: Decimal::ZERO,
                batch_number: None,
                expiration_date: None,
                supplier: None,
                location: Some("pharmacy".to_string()),
                notes: None,
                performed_by: None,
            })
            .await
            .unwrap();
        (repo, item)
    }

    fn draft(item: &StockItem, movement_type: MovementType, quantity: i64) -> MovementDraft {
        MovementDraft {
            stock_item_id: item.id,
            movement_type,
            quantity: Decimal::from(quantity),
            reason: MovementReason::Other,
            reference: None,
            idempotency_key: None,
            reversal_of: None,
            to_location: None,
            performed_by: "dr.reyes".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_append_records_balances() {
        let (repo, item) = seeded(10).await;
        let ledger = MovementLedger::new(repo, 50);

        let (movement, item) = ledger
            .append(draft(&item, MovementType::Out, 4))
            .await
            .unwrap();

        assert_eq!(movement.balance_before, Decimal::from(10));
        assert_eq!(movement.balance_after, Decimal::from(6));
        assert_eq!(item.current_quantity, Decimal::from(6));
    }

    #[tokio::test]
    async fn test_transfer_carries_balance_and_locations() {
        let (repo, item) = seeded(7).await;
        let ledger = MovementLedger::new(repo, 50);

        let mut transfer = draft(&item, MovementType::Transfer, 0);
        transfer.to_location = Some("ward-b".to_string());
        let (movement, item) = ledger.append(transfer).await.unwrap();

        assert_eq!(movement.quantity, Decimal::from(7));
        assert_eq!(movement.from_location.as_deref(), Some("pharmacy"));
        assert_eq!(movement.to_location.as_deref(), Some("ward-b"));
        assert_eq!(item.current_quantity, Decimal::from(7));
        assert_eq!(item.location.as_deref(), Some("ward-b"));
    }

    #[tokio::test]
    async fn test_stale_item_is_busy() {
        let (repo, item) = seeded(10).await;
        let ledger = MovementLedger::new(repo, 50);

        ledger.append(draft(&item, MovementType::Out, 1)).await.unwrap();
        let stale = ledger.append_to(&item, draft(&item, MovementType::Out, 1)).await;

        assert!(matches!(stale, Err(AppError::Busy(_))));
    }

    #[tokio::test]
    async fn test_history_pages_and_restarts() {
        let (repo, item) = seeded(10).await;
        let ledger = MovementLedger::new(repo, 2);
        for _ in 0..4 {
            ledger.append(draft(&item, MovementType::Out, 1)).await.unwrap();
        }

        let mut history = ledger.list_by_item(item.id, TimeRange::all());
        let mut sizes = Vec::new();
        while let Some(page) = history.next_page().await.unwrap() {
            sizes.push(page.len());
        }
        // initial stock plus four dispenses
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(history.next_page().await.unwrap().is_none());

        history.restart();
        let first = history.next_page().await.unwrap().unwrap();
        assert_eq!(first[0].reason, MovementReason::InitialStock);
    }

    #[tokio::test]
    async fn test_verify_and_export() {
        let (repo, item) = seeded(5).await;
        let ledger = MovementLedger::new(repo, 50);
        ledger.append(draft(&item, MovementType::In, 3)).await.unwrap();
        ledger
            .append(draft(&item, MovementType::Adjustment, 6))
            .await
            .unwrap();

        let check = ledger.verify(item.id).await.unwrap();
        assert!(check.consistent);
        assert_eq!(check.movement_count, 3);
        assert_eq!(check.replayed_balance, Decimal::from(6));

        let csv = ledger.export_csv(item.id, TimeRange::all()).await.unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("sequence,occurred_at,movement_id"));
        assert_eq!(lines.count(), 3);
    }
}
