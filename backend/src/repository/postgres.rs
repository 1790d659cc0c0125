//! PostgreSQL repository
//!
//! Commits run in a transaction that locks the item row with
//! `SELECT ... FOR UPDATE` under a `lock_timeout`, re-checks the balance the
//! movement was validated against, then inserts the movement and writes the
//! new balance. Dropping the future before `COMMIT` rolls everything back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    MovementReason, MovementReference, MovementType, ReferenceKind, StockCategory, StockItem,
    StockItemFilter, StockMovement, StockUnit, TimeRange,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{NewMovement, StockRepository};
use crate::config::Config;
use crate::error::{AppError, AppResult};

const ITEM_COLUMNS: &str = "id, name, category, unit, current_quantity, minimum_quantity, \
    maximum_quantity, unit_cost, selling_price, batch_number, expiration_date, supplier, \
    location, active, notes, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, sequence, stock_item_id, movement_type, quantity, \
    balance_before, balance_after, reason, reference_type, reference_id, reference_line, \
    idempotency_key, reversal_of, from_location, to_location, performed_by, occurred_at, notes";

/// Row for the stock_items table
#[derive(Debug, FromRow)]
struct StockItemRow {
    id: Uuid,
    name: String,
    category: String,
    unit: String,
    current_quantity: Decimal,
    minimum_quantity: Decimal,
    maximum_quantity: Option<Decimal>,
    unit_cost: Decimal,
    selling_price: Decimal,
    batch_number: Option<String>,
    expiration_date: Option<NaiveDate>,
    supplier: Option<String>,
    location: Option<String>,
    active: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StockItemRow> for StockItem {
    type Error = AppError;

    fn try_from(row: StockItemRow) -> Result<Self, Self::Error> {
        let category = StockCategory::from_str(&row.category).ok_or_else(|| {
            AppError::Internal(format!("Unknown stock category '{}'", row.category))
        })?;
        let unit = StockUnit::from_str(&row.unit)
            .ok_or_else(|| AppError::Internal(format!("Unknown stock unit '{}'", row.unit)))?;

        Ok(StockItem {
            id: row.id,
            name: row.name,
            category,
            unit,
            current_quantity: row.current_quantity,
            minimum_quantity: row.minimum_quantity,
            maximum_quantity: row.maximum_quantity,
            unit_cost: row.unit_cost,
            selling_price: row.selling_price,
            batch_number: row.batch_number,
            expiration_date: row.expiration_date,
            supplier: row.supplier,
            location: row.location,
            active: row.active,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row for the stock_movements table
#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    sequence: i64,
    stock_item_id: Uuid,
    movement_type: String,
    quantity: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    reason: String,
    reference_type: Option<String>,
    reference_id: Option<String>,
    reference_line: Option<i32>,
    idempotency_key: Option<String>,
    reversal_of: Option<Uuid>,
    from_location: Option<String>,
    to_location: Option<String>,
    performed_by: String,
    occurred_at: DateTime<Utc>,
    notes: Option<String>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::from_str(&row.movement_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown movement type '{}'", row.movement_type))
        })?;
        let reason = MovementReason::from_str(&row.reason)
            .ok_or_else(|| AppError::Internal(format!("Unknown movement reason '{}'", row.reason)))?;

        let reference = match (row.reference_type, row.reference_id) {
            (Some(kind), Some(id)) => {
                let kind = ReferenceKind::from_str(&kind).ok_or_else(|| {
                    AppError::Internal(format!("Unknown reference kind '{}'", kind))
                })?;
                Some(MovementReference {
                    kind,
                    id,
                    line: row.reference_line.and_then(|line| u32::try_from(line).ok()),
                })
            }
            _ => None,
        };

        Ok(StockMovement {
            id: row.id,
            sequence: row.sequence,
            stock_item_id: row.stock_item_id,
            movement_type,
            quantity: row.quantity,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            reason,
            reference,
            idempotency_key: row.idempotency_key,
            reversal_of: row.reversal_of,
            from_location: row.from_location,
            to_location: row.to_location,
            performed_by: row.performed_by,
            occurred_at: row.occurred_at,
            notes: row.notes,
        })
    }
}

/// Translate driver errors into ledger errors where the database is enforcing
/// one of our rules
fn map_db_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            if constraint.contains("idempotency") {
                return AppError::DuplicateEntry("idempotency_key".to_string());
            }
            if constraint.contains("name") {
                return AppError::DuplicateEntry("name".to_string());
            }
        }
        match db_err.code().as_deref() {
            // lock_not_available, serialization_failure, deadlock_detected
            Some("55P03") | Some("40001") | Some("40P01") => {
                return AppError::Busy(db_err.message().to_string());
            }
            _ => {}
        }
    }
    AppError::DatabaseError(err)
}

/// PostgreSQL-backed [`StockRepository`]
#[derive(Clone)]
pub struct PgStockRepository {
    db: PgPool,
    lock_timeout: Duration,
}

impl PgStockRepository {
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Open the pool described by configuration
    pub async fn connect(config: &Config) -> AppResult<Self> {
        tracing::info!("Connecting to database...");
        let db = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
            .connect(&config.database.url)
            .await?;
        tracing::info!("Database connection established");

        Ok(Self::new(db, config.inventory.lock_timeout()))
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> AppResult<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;
        tracing::info!("Migrations completed");
        Ok(())
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.db.begin().await?;
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement).execute(&mut *tx).await?;
        Ok(tx)
    }

    async fn insert_movement(
        tx: &mut Transaction<'static, Postgres>,
        movement: &NewMovement,
    ) -> AppResult<StockMovement> {
        let statement = format!(
            r#"
            INSERT INTO stock_movements (
                id, stock_item_id, movement_type, quantity, balance_before, balance_after,
                reason, reference_type, reference_id, reference_line, idempotency_key,
                reversal_of, from_location, to_location, performed_by, occurred_at, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {MOVEMENT_COLUMNS}
            "#
        );

        let reference = movement.reference.as_ref();
        let row = sqlx::query_as::<_, MovementRow>(&statement)
            .bind(movement.id)
            .bind(movement.stock_item_id)
            .bind(movement.movement_type.as_str())
            .bind(movement.quantity)
            .bind(movement.balance_before)
            .bind(movement.balance_after)
            .bind(movement.reason.as_str())
            .bind(reference.map(|r| r.kind.as_str()))
            .bind(reference.map(|r| r.id.as_str()))
            .bind(reference.and_then(|r| r.line).map(|line| line as i32))
            .bind(movement.idempotency_key.as_deref())
            .bind(movement.reversal_of)
            .bind(movement.from_location.as_deref())
            .bind(movement.to_location.as_deref())
            .bind(&movement.performed_by)
            .bind(movement.occurred_at)
            .bind(movement.notes.as_deref())
            .fetch_one(&mut **tx)
            .await
            .map_err(map_db_error)?;

        row.try_into()
    }
}

#[async_trait]
impl StockRepository for PgStockRepository {
    async fn insert_item(
        &self,
        item: &StockItem,
        initial: Option<NewMovement>,
    ) -> AppResult<(StockItem, Option<StockMovement>)> {
        let mut tx = self.begin().await?;

        let statement = format!(
            r#"
            INSERT INTO stock_items (
                id, name, category, unit, current_quantity, minimum_quantity, maximum_quantity,
                unit_cost, selling_price, batch_number, expiration_date, supplier, location,
                active, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {ITEM_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, StockItemRow>(&statement)
            .bind(item.id)
            .bind(&item.name)
            .bind(item.category.as_str())
            .bind(item.unit.as_str())
            .bind(item.current_quantity)
            .bind(item.minimum_quantity)
            .bind(item.maximum_quantity)
            .bind(item.unit_cost)
            .bind(item.selling_price)
            .bind(item.batch_number.as_deref())
            .bind(item.expiration_date)
            .bind(item.supplier.as_deref())
            .bind(item.location.as_deref())
            .bind(item.active)
            .bind(item.notes.as_deref())
            .bind(item.created_at)
            .bind(item.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let movement = match initial {
            Some(movement) => Some(Self::insert_movement(&mut tx, &movement).await?),
            None => None,
        };

        tx.commit().await?;

        Ok((row.try_into()?, movement))
    }

    async fn update_item(&self, item: &StockItem) -> AppResult<StockItem> {
        let statement = format!(
            r#"
            UPDATE stock_items
            SET name = $2, category = $3, unit = $4, minimum_quantity = $5,
                maximum_quantity = $6, unit_cost = $7, selling_price = $8, batch_number = $9,
                expiration_date = $10, supplier = $11, location = $12, active = $13,
                notes = $14, updated_at = $15
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, StockItemRow>(&statement)
            .bind(item.id)
            .bind(&item.name)
            .bind(item.category.as_str())
            .bind(item.unit.as_str())
            .bind(item.minimum_quantity)
            .bind(item.maximum_quantity)
            .bind(item.unit_cost)
            .bind(item.selling_price)
            .bind(item.batch_number.as_deref())
            .bind(item.expiration_date)
            .bind(item.supplier.as_deref())
            .bind(item.location.as_deref())
            .bind(item.active)
            .bind(item.notes.as_deref())
            .bind(item.updated_at)
            .fetch_optional(&self.db)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;

        row.try_into()
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<StockItem>> {
        let statement = format!("SELECT {ITEM_COLUMNS} FROM stock_items WHERE id = $1");
        sqlx::query_as::<_, StockItemRow>(&statement)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(StockItem::try_from)
            .transpose()
    }

    async fn list_items(&self, filter: &StockItemFilter) -> AppResult<Vec<StockItem>> {
        let statement = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM stock_items
            WHERE ($1::varchar IS NULL OR category = $1)
              AND ($2::boolean IS NULL OR active = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%')
            ORDER BY lower(name), id
            "#
        );

        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        sqlx::query_as::<_, StockItemRow>(&statement)
            .bind(filter.category.map(|c| c.as_str()))
            .bind(filter.active)
            .bind(search)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(StockItem::try_from)
            .collect()
    }

    async fn find_item_by_name(&self, name: &str) -> AppResult<Option<StockItem>> {
        let statement = format!(
            "SELECT {ITEM_COLUMNS} FROM stock_items \
             WHERE active AND lower(btrim(name)) = lower(btrim($1))"
        );
        sqlx::query_as::<_, StockItemRow>(&statement)
            .bind(name)
            .fetch_optional(&self.db)
            .await?
            .map(StockItem::try_from)
            .transpose()
    }

    async fn commit_movement(&self, movement: NewMovement) -> AppResult<(StockMovement, StockItem)> {
        let mut tx = self.begin().await?;

        let stored: Option<Decimal> = sqlx::query_scalar(
            "SELECT current_quantity FROM stock_items WHERE id = $1 FOR UPDATE",
        )
        .bind(movement.stock_item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let stored = stored.ok_or_else(|| AppError::NotFound("Stock item".to_string()))?;
        if stored != movement.balance_before {
            return Err(AppError::Busy(format!(
                "balance of {} changed from {} to {} before commit",
                movement.stock_item_id, movement.balance_before, stored
            )));
        }

        let committed = Self::insert_movement(&mut tx, &movement).await?;

        let statement = format!(
            r#"
            UPDATE stock_items
            SET current_quantity = $2, location = COALESCE($3, location), updated_at = $4
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, StockItemRow>(&statement)
            .bind(movement.stock_item_id)
            .bind(movement.balance_after)
            .bind(movement.new_location())
            .bind(movement.occurred_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await?;

        Ok((committed, row.try_into()?))
    }

    async fn get_movement(&self, id: Uuid) -> AppResult<Option<StockMovement>> {
        let statement = format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE id = $1");
        sqlx::query_as::<_, MovementRow>(&statement)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(StockMovement::try_from)
            .transpose()
    }

    async fn find_movement_by_key(&self, idempotency_key: &str) -> AppResult<Option<StockMovement>> {
        let statement =
            format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE idempotency_key = $1");
        sqlx::query_as::<_, MovementRow>(&statement)
            .bind(idempotency_key)
            .fetch_optional(&self.db)
            .await?
            .map(StockMovement::try_from)
            .transpose()
    }

    async fn list_movements(
        &self,
        stock_item_id: Uuid,
        range: &TimeRange,
        after_sequence: Option<i64>,
        limit: u32,
    ) -> AppResult<Vec<StockMovement>> {
        let statement = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE stock_item_id = $1
              AND ($2::timestamptz IS NULL OR occurred_at >= $2)
              AND ($3::timestamptz IS NULL OR occurred_at <= $3)
              AND ($4::bigint IS NULL OR sequence > $4)
            ORDER BY sequence ASC
            LIMIT $5
            "#
        );

        sqlx::query_as::<_, MovementRow>(&statement)
            .bind(stock_item_id)
            .bind(range.from)
            .bind(range.to)
            .bind(after_sequence)
            .bind(i64::from(limit))
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(StockMovement::try_from)
            .collect()
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
