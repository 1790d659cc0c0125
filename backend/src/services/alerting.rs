//! Read-only alert and summary views over the catalog

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{ExpiryStatus, StockCategory, StockItem, StockItemFilter, StockStatus};

use crate::error::{AppError, AppResult};
use crate::repository::StockRepository;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    pub category: Option<StockCategory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockAlert {
    pub item: StockItem,
    pub status: StockStatus,
    /// Quantity needed to get back above the minimum, or to the maximum when set
    pub reorder_quantity: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiryAlert {
    pub item: StockItem,
    pub status: ExpiryStatus,
    /// Negative once expired
    pub days_until_expiry: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: StockCategory,
    pub item_count: usize,
    pub out_of_stock_count: usize,
    pub low_stock_count: usize,
    pub total_value: Decimal,
}

/// Alerting view. Statuses are derived from the current balance on every read.
#[derive(Clone)]
pub struct AlertingView {
    repo: Arc<dyn StockRepository>,
    expiring_soon_days: i64,
}

impl AlertingView {
    pub fn new(repo: Arc<dyn StockRepository>, expiring_soon_days: i64) -> Self {
        Self {
            repo,
            expiring_soon_days,
        }
    }

    async fn active_items(&self, category: Option<StockCategory>) -> AppResult<Vec<StockItem>> {
        self.repo
            .list_items(&StockItemFilter {
                category,
                active: Some(true),
                search: None,
            })
            .await
    }

    /// Active items at or below their minimum, out-of-stock first
    pub async fn low_stock_items(&self, filter: &AlertFilter) -> AppResult<Vec<StockAlert>> {
        let mut alerts: Vec<StockAlert> = self
            .active_items(filter.category)
            .await?
            .into_iter()
            .filter_map(|item| {
                let status = item.status();
                (status != StockStatus::Normal).then(|| StockAlert {
                    reorder_quantity: reorder_quantity(&item),
                    status,
                    item,
                })
            })
            .collect();

        // list_items is already ordered by name, and the sort is stable
        alerts.sort_by_key(|alert| alert.status);
        Ok(alerts)
    }

    /// Active items expiring within `within_days` (the configured window by default)
    pub async fn expiring_soon(&self, within_days: Option<i64>) -> AppResult<Vec<ExpiryAlert>> {
        self.expiring_soon_on(Utc::now().date_naive(), within_days).await
    }

    pub async fn expiring_soon_on(
        &self,
        today: NaiveDate,
        within_days: Option<i64>,
    ) -> AppResult<Vec<ExpiryAlert>> {
        let window = within_days.unwrap_or(self.expiring_soon_days);
        if window < 0 {
            return Err(AppError::validation("within_days", "Window must not be negative"));
        }
        self.expiry_alerts(today, window, ExpiryStatus::ExpiringSoon).await
    }

    /// Active items past their expiration date
    pub async fn expired_items(&self) -> AppResult<Vec<ExpiryAlert>> {
        self.expired_on(Utc::now().date_naive()).await
    }

    pub async fn expired_on(&self, today: NaiveDate) -> AppResult<Vec<ExpiryAlert>> {
        self.expiry_alerts(today, self.expiring_soon_days, ExpiryStatus::Expired)
            .await
    }

    async fn expiry_alerts(
        &self,
        today: NaiveDate,
        window: i64,
        wanted: ExpiryStatus,
    ) -> AppResult<Vec<ExpiryAlert>> {
        let mut alerts: Vec<ExpiryAlert> = self
            .active_items(None)
            .await?
            .into_iter()
            .filter_map(|item| {
                let expiration = item.expiration_date?;
                let status = item.expiry_status(today, window);
                (status == wanted).then(|| ExpiryAlert {
                    days_until_expiry: (expiration - today).num_days(),
                    status,
                    item,
                })
            })
            .collect();

        alerts.sort_by_key(|alert| alert.days_until_expiry);
        Ok(alerts)
    }

    /// Per-category counts and stock value over active items
    pub async fn summary(&self) -> AppResult<Vec<CategorySummary>> {
        let items = self.active_items(None).await?;

        Ok(StockCategory::ALL
            .iter()
            .map(|&category| {
                let in_category = items.iter().filter(|item| item.category == category);
                let mut summary = CategorySummary {
                    category,
                    item_count: 0,
                    out_of_stock_count: 0,
                    low_stock_count: 0,
                    total_value: Decimal::ZERO,
                };
                for item in in_category {
                    summary.item_count += 1;
                    match item.status() {
                        StockStatus::OutOfStock => summary.out_of_stock_count += 1,
                        StockStatus::Low => summary.low_stock_count += 1,
                        StockStatus::Normal => {}
                    }
                    summary.total_value += item.stock_value();
                }
                summary
            })
            .collect())
    }
}

fn reorder_quantity(item: &StockItem) -> Decimal {
    let target = item
        .maximum_quantity
        .unwrap_or(item.minimum_quantity + Decimal::ONE);
    (target - item.current_quantity).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::StockUnit;
    use uuid::Uuid;

    fn item(current: i64, minimum: i64, maximum: Option<i64>) -> StockItem {
        StockItem {
            id: Uuid::new_v4(),
            name: "Gauze".to_string(),
            category: StockCategory::Consumable,
            unit: StockUnit::Pack,
            current_quantity: Decimal::from(current),
            minimum_quantity: Decimal::from(minimum),
            maximum_quantity: maximum.map(Decimal::from),
            unit_cost: Decimal::ZERO,
            selling_price: Decimal::ZERO,
            batch_number: None,
            expiration_date: None,
            supplier: None,
            location: None,
            active: true,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_reorder_quantity_targets_maximum() {
        assert_eq!(reorder_quantity(&item(2, 5, Some(20))), Decimal::from(18));
    }

    #[test]
    fn test_reorder_quantity_without_maximum() {
        assert_eq!(reorder_quantity(&item(2, 5, None)), Decimal::from(4));
        assert_eq!(reorder_quantity(&item(9, 5, None)), Decimal::ZERO);
    }
}
