//! Validation rules for stock items and movements

use rust_decimal::Decimal;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::models::{CreateStockItemInput, StockItem};

/// A rejected field with a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<ValidationErrors> for FieldError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);

        match fields.first() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} has an invalid length", field));
                FieldError::new(*field, message)
            }
            None => FieldError::new("input", "Invalid input"),
        }
    }
}

// ============================================================================
// Scalar rules
// ============================================================================

/// Names must contain something other than whitespace
pub fn validate_item_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Name must not be empty");
    }
    Ok(())
}

/// Quantities and prices are never negative
pub fn validate_non_negative(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("Value must not be negative");
    }
    Ok(())
}

/// A maximum, when present, must not be below the minimum
pub fn validate_thresholds(minimum: Decimal, maximum: Option<Decimal>) -> Result<(), &'static str> {
    validate_non_negative(minimum).map_err(|_| "Minimum quantity must not be negative")?;
    if let Some(maximum) = maximum {
        if maximum < minimum {
            return Err("Maximum quantity must be greater than or equal to minimum quantity");
        }
    }
    Ok(())
}

/// Transfer destinations must be non-empty
pub fn validate_location(location: &str) -> Result<(), &'static str> {
    if location.trim().is_empty() {
        return Err("Location must not be empty");
    }
    Ok(())
}

/// Actor identity recorded on movements must be present
pub fn validate_actor(performed_by: &str) -> Result<(), &'static str> {
    if performed_by.trim().is_empty() {
        return Err("performed_by must identify the operator");
    }
    Ok(())
}

// ============================================================================
// Item rules
// ============================================================================

fn check(field: &str, result: Result<(), &'static str>) -> Result<(), FieldError> {
    result.map_err(|message| FieldError::new(field, message))
}

fn validate_values(
    name: &str,
    minimum: Decimal,
    maximum: Option<Decimal>,
    unit_cost: Decimal,
    selling_price: Decimal,
) -> Result<(), FieldError> {
    check("name", validate_item_name(name))?;
    let threshold_field = if minimum < Decimal::ZERO {
        "minimum_quantity"
    } else {
        "maximum_quantity"
    };
    check(threshold_field, validate_thresholds(minimum, maximum))?;
    check("unit_cost", validate_non_negative(unit_cost))?;
    check("selling_price", validate_non_negative(selling_price))?;
    Ok(())
}

/// Validate input for a new catalog entry
pub fn validate_new_item(input: &CreateStockItemInput) -> Result<(), FieldError> {
    input.validate()?;
    check("current_quantity", validate_non_negative(input.current_quantity))?;
    validate_values(
        &input.name,
        input.minimum_quantity,
        input.maximum_quantity,
        input.unit_cost,
        input.selling_price,
    )
}

/// Validate a catalog entry after a patch has been merged into it
pub fn validate_item(item: &StockItem) -> Result<(), FieldError> {
    validate_values(
        &item.name,
        item.minimum_quantity,
        item.maximum_quantity,
        item.unit_cost,
        item.selling_price,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StockCategory, StockUnit};

    fn input() -> CreateStockItemInput {
        CreateStockItemInput {
            name: "Amoxicillin 500mg".to_string(),
            category: StockCategory::Medication,
            unit: StockUnit::Box,
            current_quantity: Decimal::from(20),
            minimum_quantity: Decimal::from(5),
            maximum_quantity: Some(Decimal::from(50)),
            unit_cost: Decimal::new(1250, 2),
            selling_price: Decimal::new(2500, 2),
            batch_number: Some("AMX-2026-01".to_string()),
            expiration_date: None,
            supplier: None,
            location: Some("Pharmacy shelf A".to_string()),
            notes: None,
            performed_by: None,
        }
    }

    #[test]
    fn test_valid_item() {
        assert!(validate_new_item(&input()).is_ok());
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut item = input();
        item.name = "   ".to_string();
        assert_eq!(validate_new_item(&item).unwrap_err().field, "name");

        item.name = String::new();
        assert_eq!(validate_new_item(&item).unwrap_err().field, "name");
    }

    #[test]
    fn test_negative_minimum_rejected() {
        let mut item = input();
        item.minimum_quantity = Decimal::from(-1);
        assert_eq!(validate_new_item(&item).unwrap_err().field, "minimum_quantity");
    }

    #[test]
    fn test_maximum_below_minimum_rejected() {
        let mut item = input();
        item.maximum_quantity = Some(Decimal::from(4));
        assert_eq!(validate_new_item(&item).unwrap_err().field, "maximum_quantity");

        item.maximum_quantity = Some(Decimal::from(5));
        assert!(validate_new_item(&item).is_ok());
    }

    #[test]
    fn test_negative_prices_rejected() {
        let mut item = input();
        item.unit_cost = Decimal::new(-1, 2);
        assert_eq!(validate_new_item(&item).unwrap_err().field, "unit_cost");

        let mut item = input();
        item.selling_price = Decimal::from(-3);
        assert_eq!(validate_new_item(&item).unwrap_err().field, "selling_price");
    }

    #[test]
    fn test_negative_starting_quantity_rejected() {
        let mut item = input();
        item.current_quantity = Decimal::from(-2);
        assert_eq!(validate_new_item(&item).unwrap_err().field, "current_quantity");
    }

    #[test]
    fn test_location_and_actor() {
        assert!(validate_location("Ward 2").is_ok());
        assert!(validate_location(" ").is_err());
        assert!(validate_actor("dr.silva").is_ok());
        assert!(validate_actor("").is_err());
    }
}
