//! Stock item catalog models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::reconciler::{self, ExpiryStatus, StockStatus};

/// Category of a trackable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockCategory {
    Medication,
    Vaccine,
    Consumable,
    Equipment,
    Supplement,
}

impl StockCategory {
    pub const ALL: [StockCategory; 5] = [
        StockCategory::Medication,
        StockCategory::Vaccine,
        StockCategory::Consumable,
        StockCategory::Equipment,
        StockCategory::Supplement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockCategory::Medication => "medication",
            StockCategory::Vaccine => "vaccine",
            StockCategory::Consumable => "consumable",
            StockCategory::Equipment => "equipment",
            StockCategory::Supplement => "supplement",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "medication" => Some(StockCategory::Medication),
            "vaccine" => Some(StockCategory::Vaccine),
            "consumable" => Some(StockCategory::Consumable),
            "equipment" => Some(StockCategory::Equipment),
            "supplement" => Some(StockCategory::Supplement),
            _ => None,
        }
    }
}

/// Unit an item is counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockUnit {
    Unit,
    Box,
    Vial,
    Bottle,
    Pack,
    Kg,
    G,
    Ml,
    L,
}

impl StockUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockUnit::Unit => "unit",
            StockUnit::Box => "box",
            StockUnit::Vial => "vial",
            StockUnit::Bottle => "bottle",
            StockUnit::Pack => "pack",
            StockUnit::Kg => "kg",
            StockUnit::G => "g",
            StockUnit::Ml => "ml",
            StockUnit::L => "l",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unit" => Some(StockUnit::Unit),
            "box" => Some(StockUnit::Box),
            "vial" => Some(StockUnit::Vial),
            "bottle" => Some(StockUnit::Bottle),
            "pack" => Some(StockUnit::Pack),
            "kg" => Some(StockUnit::Kg),
            "g" => Some(StockUnit::G),
            "ml" => Some(StockUnit::Ml),
            "l" => Some(StockUnit::L),
            _ => None,
        }
    }
}

/// A catalog entry whose on-hand quantity is tracked by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: Uuid,
    pub name: String,
    pub category: StockCategory,
    pub unit: StockUnit,
    /// Authoritative balance; only the movement ledger writes it
    pub current_quantity: Decimal,
    pub minimum_quantity: Decimal,
    pub maximum_quantity: Option<Decimal>,
    pub unit_cost: Decimal,
    pub selling_price: Decimal,
    pub batch_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub supplier: Option<String>,
    pub location: Option<String>,
    pub active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Current stock status, derived from the balance and minimum threshold
    pub fn status(&self) -> StockStatus {
        reconciler::stock_status(self.current_quantity, self.minimum_quantity)
    }

    /// Expiry classification relative to `today`
    pub fn expiry_status(&self, today: NaiveDate, window_days: i64) -> ExpiryStatus {
        reconciler::expiry_status(self.expiration_date, today, window_days)
    }

    /// On-hand value at unit cost
    pub fn stock_value(&self) -> Decimal {
        self.current_quantity * self.unit_cost
    }

    /// Normalized form of the name used for uniqueness and lookups
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Trim and lowercase a product name for case-insensitive comparison
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Input for creating a stock item
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateStockItemInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub category: StockCategory,
    pub unit: StockUnit,
    /// Starting balance, recorded as the item's first `in` movement
    #[serde(default)]
    pub current_quantity: Decimal,
    #[serde(default)]
    pub minimum_quantity: Decimal,
    pub maximum_quantity: Option<Decimal>,
    #[serde(default)]
    pub unit_cost: Decimal,
    #[serde(default)]
    pub selling_price: Decimal,
    #[validate(length(max = 100))]
    pub batch_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    #[validate(length(max = 200))]
    pub supplier: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    /// Operator recorded on the initial stocking movement
    pub performed_by: Option<String>,
}

/// Patch for descriptive fields of a stock item.
///
/// `current_quantity` is accepted by the deserializer only so that the store can
/// reject it explicitly; balances change through movements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateStockItemInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<StockCategory>,
    pub unit: Option<StockUnit>,
    pub current_quantity: Option<Decimal>,
    pub minimum_quantity: Option<Decimal>,
    /// `Some(None)` clears the maximum
    #[serde(default, with = "double_option")]
    pub maximum_quantity: Option<Option<Decimal>>,
    pub unit_cost: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    #[validate(length(max = 100))]
    pub batch_number: Option<String>,
    #[serde(default, with = "double_option")]
    pub expiration_date: Option<Option<NaiveDate>>,
    #[validate(length(max = 200))]
    pub supplier: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub active: Option<bool>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Filter for listing stock items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockItemFilter {
    pub category: Option<StockCategory>,
    pub active: Option<bool>,
    /// Case-insensitive substring of the name
    pub search: Option<String>,
}

impl StockItemFilter {
    pub fn matches(&self, item: &StockItem) -> bool {
        if let Some(category) = self.category {
            if item.category != category {
                return false;
            }
        }
        if let Some(active) = self.active {
            if item.active != active {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(search) if !search.is_empty() => {
                item.name.to_lowercase().contains(&search.to_lowercase())
            }
            _ => true,
        }
    }
}

/// Distinguishes an absent field from an explicit `null` in patches
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        for category in StockCategory::ALL {
            assert_eq!(StockCategory::from_str(category.as_str()), Some(category));
        }
        assert_eq!(StockCategory::from_str("feed"), None);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!(StockUnit::from_str("vial"), Some(StockUnit::Vial));
        assert_eq!(StockUnit::from_str("ml"), Some(StockUnit::Ml));
        assert_eq!(StockUnit::from_str("litre"), None);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Amoxicillin 500MG "), "amoxicillin 500mg");
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let absent: UpdateStockItemInput = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.maximum_quantity, None);

        let cleared: UpdateStockItemInput =
            serde_json::from_str(r#"{"maximum_quantity": null}"#).unwrap();
        assert_eq!(cleared.maximum_quantity, Some(None));

        let set: UpdateStockItemInput =
            serde_json::from_str(r#"{"maximum_quantity": "40"}"#).unwrap();
        assert_eq!(set.maximum_quantity, Some(Some(Decimal::from(40))));
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let now = Utc::now();
        let item = StockItem {
            id: Uuid::new_v4(),
            name: "Ivermectin 1%".to_string(),
            category: StockCategory::Medication,
            unit: StockUnit::Bottle,
            current_quantity: Decimal::from(3),
            minimum_quantity: Decimal::ZERO,
            maximum_quantity: None,
            unit_cost: Decimal::ZERO,
            selling_price: Decimal::ZERO,
            batch_number: None,
            expiration_date: None,
            supplier: None,
            location: None,
            active: true,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let filter = StockItemFilter {
            search: Some("IVERMEC".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&item));

        let filter = StockItemFilter {
            category: Some(StockCategory::Vaccine),
            ..Default::default()
        };
        assert!(!filter.matches(&item));
    }
}
