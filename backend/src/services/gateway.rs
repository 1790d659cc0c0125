//! Deduction gateway: the only entry point that changes stock balances
//!
//! Every operation runs as one unit under the item's lock: read the item,
//! validate, append the movement and write the new balance. A consumer action
//! replayed with the same reference returns the movement it produced the first
//! time instead of deducting again.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    validate_location, ConsumerLine, MovementReason, MovementReference, MovementType,
    ReferenceKind, StockItem, StockMovement, StockStatus,
};
use uuid::Uuid;

use super::ledger::{MovementDraft, MovementLedger};
use super::locks::ItemLocks;
use super::stock_item::StockItemStore;
use crate::error::{AppError, AppResult};
use crate::repository::StockRepository;

/// Dispense or receive request
#[derive(Debug, Clone, Deserialize)]
pub struct QuantityChangeInput {
    pub quantity: Decimal,
    /// Consumer record the change belongs to; makes the request idempotent
    pub reference: Option<MovementReference>,
    pub reason: Option<MovementReason>,
    pub performed_by: String,
    pub notes: Option<String>,
}

/// Physical recount
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustInput {
    /// Counted balance; the item is set to this value
    pub new_quantity: Decimal,
    pub reason: Option<MovementReason>,
    pub performed_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferInput {
    pub to_location: String,
    pub performed_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReverseInput {
    pub performed_by: String,
    /// Why the original movement is being undone; stored as the movement notes
    pub reason: Option<String>,
}

/// Committed (or replayed) movement together with the resulting item state
#[derive(Debug, Clone, Serialize)]
pub struct MovementOutcome {
    pub movement: StockMovement,
    pub item: StockItem,
    pub status: StockStatus,
    /// True when an earlier movement with the same reference was returned
    pub replayed: bool,
}

impl MovementOutcome {
    fn new(movement: StockMovement, item: StockItem, replayed: bool) -> Self {
        Self {
            status: item.status(),
            movement,
            item,
            replayed,
        }
    }
}

/// What happened to one consumer line
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineDeduction {
    /// The operator did not ask for the line to be deducted
    Skipped,
    /// No active catalog entry matches the line; recorded as a manual entry
    Unmatched { product_name: String },
    Deducted(MovementOutcome),
}

#[derive(Clone)]
pub struct DeductionGateway {
    repo: Arc<dyn StockRepository>,
    ledger: MovementLedger,
    store: StockItemStore,
    locks: Arc<ItemLocks>,
    lock_timeout: Duration,
}

impl DeductionGateway {
    pub fn new(
        repo: Arc<dyn StockRepository>,
        ledger: MovementLedger,
        locks: Arc<ItemLocks>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store: StockItemStore::new(repo.clone(), locks.clone(), lock_timeout),
            repo,
            ledger,
            locks,
            lock_timeout,
        }
    }

    /// Remove stock for a consumer (prescription, treatment, sale, loss)
    #[tracing::instrument(skip(self, input), fields(quantity = %input.quantity))]
    pub async fn dispense(
        &self,
        stock_item_id: Uuid,
        input: QuantityChangeInput,
    ) -> AppResult<MovementOutcome> {
        check_positive(input.quantity)?;
        let reason = input.reason.unwrap_or_else(|| dispense_reason(input.reference.as_ref()));
        let key = input
            .reference
            .as_ref()
            .map(|r| r.idempotency_key(MovementType::Out));

        self.execute(stock_item_id, key, input.quantity, |item| {
            if item.current_quantity < input.quantity {
                return Err(AppError::InsufficientStock {
                    item_id: item.id,
                    available: item.current_quantity,
                    requested: input.quantity,
                });
            }
            Ok(MovementDraft {
                stock_item_id: item.id,
                movement_type: MovementType::Out,
                quantity: input.quantity,
                reason,
                reference: input.reference,
                idempotency_key: None,
                reversal_of: None,
                to_location: None,
                performed_by: input.performed_by,
                notes: input.notes,
            })
        })
        .await
    }

    /// Add stock from a delivery or a return
    #[tracing::instrument(skip(self, input), fields(quantity = %input.quantity))]
    pub async fn receive(
        &self,
        stock_item_id: Uuid,
        input: QuantityChangeInput,
    ) -> AppResult<MovementOutcome> {
        check_positive(input.quantity)?;
        let key = input
            .reference
            .as_ref()
            .map(|r| r.idempotency_key(MovementType::In));

        self.execute(stock_item_id, key, input.quantity, |item| {
            Ok(MovementDraft {
                stock_item_id: item.id,
                movement_type: MovementType::In,
                quantity: input.quantity,
                reason: input.reason.unwrap_or(MovementReason::Purchase),
                reference: input.reference,
                idempotency_key: None,
                reversal_of: None,
                to_location: None,
                performed_by: input.performed_by,
                notes: input.notes,
            })
        })
        .await
    }

    /// Set the balance to a counted quantity
    #[tracing::instrument(skip(self, input), fields(new_quantity = %input.new_quantity))]
    pub async fn adjust(&self, stock_item_id: Uuid, input: AdjustInput) -> AppResult<MovementOutcome> {
        if input.new_quantity < Decimal::ZERO {
            return Err(AppError::InvalidQuantity {
                quantity: input.new_quantity,
                message: "Counted quantity must not be negative".to_string(),
            });
        }

        self.execute(stock_item_id, None, input.new_quantity, |item| {
            Ok(MovementDraft {
                stock_item_id: item.id,
                movement_type: MovementType::Adjustment,
                quantity: input.new_quantity,
                reason: input.reason.unwrap_or(MovementReason::Recount),
                reference: None,
                idempotency_key: None,
                reversal_of: None,
                to_location: None,
                performed_by: input.performed_by,
                notes: input.notes,
            })
        })
        .await
    }

    /// Move the item's whole balance to another storage location
    #[tracing::instrument(skip(self, input), fields(to_location = %input.to_location))]
    pub async fn transfer(
        &self,
        stock_item_id: Uuid,
        input: TransferInput,
    ) -> AppResult<MovementOutcome> {
        validate_location(&input.to_location)
            .map_err(|msg| AppError::validation("to_location", msg))?;
        let to_location = input.to_location.trim().to_string();

        self.execute(stock_item_id, None, Decimal::ZERO, |item| {
            if item.location.as_deref().map(str::trim) == Some(to_location.as_str()) {
                return Err(AppError::validation(
                    "to_location",
                    "Item is already stored at this location",
                ));
            }
            Ok(MovementDraft {
                stock_item_id: item.id,
                movement_type: MovementType::Transfer,
                quantity: item.current_quantity,
                reason: MovementReason::Transfer,
                reference: None,
                idempotency_key: None,
                reversal_of: None,
                to_location: Some(to_location),
                performed_by: input.performed_by,
                notes: input.notes,
            })
        })
        .await
    }

    /// Undo an `in` or `out` movement with a compensating movement
    #[tracing::instrument(skip(self, input))]
    pub async fn reverse(&self, movement_id: Uuid, input: ReverseInput) -> AppResult<MovementOutcome> {
        let original = self.ledger.get(movement_id).await?;
        let movement_type = original.movement_type.inverse().ok_or_else(|| {
            AppError::validation(
                "movement_id",
                "Only in and out movements can be reversed; record a new adjustment instead",
            )
        })?;

        let reference = MovementReference::reversal_of(original.id);
        let key = reference.idempotency_key(movement_type);
        let quantity = original.quantity;

        self.execute(original.stock_item_id, Some(key), quantity, |item| {
            if movement_type == MovementType::Out && item.current_quantity < quantity {
                return Err(AppError::InsufficientStock {
                    item_id: item.id,
                    available: item.current_quantity,
                    requested: quantity,
                });
            }
            Ok(MovementDraft {
                stock_item_id: item.id,
                movement_type,
                quantity,
                reason: MovementReason::Reversal,
                reference: Some(reference),
                idempotency_key: None,
                reversal_of: Some(original.id),
                to_location: None,
                performed_by: input.performed_by,
                notes: input.reason,
            })
        })
        .await
    }

    /// Deduct one consumer line, resolving free-text names against the catalog
    #[tracing::instrument(skip(self, line), fields(source_id = %line.source_id, line = line.line_index))]
    pub async fn deduct_line(
        &self,
        line: ConsumerLine,
        performed_by: &str,
    ) -> AppResult<LineDeduction> {
        if !line.stock_deducted {
            return Ok(LineDeduction::Skipped);
        }

        let stock_item_id = match line.stock_item_id {
            Some(id) => id,
            None => match self.store.find_by_name(&line.product_name).await? {
                Some(item) => item.id,
                None => {
                    tracing::info!(
                        product_name = %line.product_name,
                        "No catalog match for consumer line; left as manual entry"
                    );
                    return Ok(LineDeduction::Unmatched {
                        product_name: line.product_name,
                    });
                }
            },
        };

        let outcome = self
            .dispense(
                stock_item_id,
                QuantityChangeInput {
                    quantity: line.quantity,
                    reference: Some(line.reference()),
                    reason: Some(line.kind.reason()),
                    performed_by: performed_by.to_string(),
                    notes: None,
                },
            )
            .await?;

        Ok(LineDeduction::Deducted(outcome))
    }

    /// Run one balance change under the item lock.
    ///
    /// `requested` is only used to flag replays whose quantity differs from
    /// the original.
    async fn execute<F>(
        &self,
        stock_item_id: Uuid,
        key: Option<String>,
        requested: Decimal,
        build: F,
    ) -> AppResult<MovementOutcome>
    where
        F: FnOnce(&StockItem) -> AppResult<MovementDraft>,
    {
        let _guard = self.locks.acquire(stock_item_id, self.lock_timeout).await?;

        if let Some(key) = &key {
            if let Some(existing) = self.repo.find_movement_by_key(key).await? {
                return self.replayed(existing, requested).await;
            }
        }

        let item = self
            .repo
            .get_item(stock_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;
        if !item.active {
            return Err(AppError::Inactive(item.id));
        }

        let mut draft = build(&item)?;
        draft.idempotency_key = key.clone();

        match self.ledger.append_to(&item, draft).await {
            Ok((movement, item)) => {
                if item.status() != StockStatus::Normal {
                    tracing::warn!(
                        item_id = %item.id,
                        status = item.status().as_str(),
                        balance = %item.current_quantity,
                        "Stock item below minimum"
                    );
                }
                Ok(MovementOutcome::new(movement, item, false))
            }
            // Another instance committed the same reference between our lookup and commit
            Err(AppError::DuplicateEntry(field)) if field == "idempotency_key" => {
                let key = key.unwrap_or_default();
                let existing = self
                    .repo
                    .find_movement_by_key(&key)
                    .await?
                    .ok_or(AppError::DuplicateEntry(field))?;
                self.replayed(existing, requested).await
            }
            Err(e) => Err(e),
        }
    }

    async fn replayed(&self, movement: StockMovement, requested: Decimal) -> AppResult<MovementOutcome> {
        if movement.quantity != requested {
            tracing::warn!(
                movement_id = %movement.id,
                original = %movement.quantity,
                requested = %requested,
                "Replayed reference with a different quantity; original movement kept"
            );
        } else {
            tracing::debug!(movement_id = %movement.id, "Replayed stock movement");
        }

        let item = self
            .repo
            .get_item(movement.stock_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;
        Ok(MovementOutcome::new(movement, item, true))
    }
}

fn check_positive(quantity: Decimal) -> AppResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(AppError::InvalidQuantity {
            quantity,
            message: "Quantity must be positive".to_string(),
        });
    }
    Ok(())
}

fn dispense_reason(reference: Option<&MovementReference>) -> MovementReason {
    match reference.map(|r| r.kind) {
        Some(ReferenceKind::Prescription) => MovementReason::Prescription,
        Some(ReferenceKind::Antiparasitic) => MovementReason::Antiparasitic,
        _ => MovementReason::Consumption,
    }
}
