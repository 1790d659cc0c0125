//! Balance rules: how each movement type changes an item's on-hand quantity,
//! and how a balance is classified for alerting.
//!
//! Everything here is a pure function of its inputs; statuses are recomputed on
//! every read and never stored.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{MovementType, StockMovement};

/// Failure to apply a movement to a balance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },

    #[error("invalid quantity {quantity} for {movement_type:?} movement")]
    InvalidQuantity {
        movement_type: MovementType,
        quantity: Decimal,
    },
}

/// Stock level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    Normal,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Low => "low",
            StockStatus::Normal => "normal",
        }
    }
}

/// Expiry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired,
    ExpiringSoon,
    Ok,
    NoExpiry,
}

impl ExpiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryStatus::Expired => "expired",
            ExpiryStatus::ExpiringSoon => "expiring_soon",
            ExpiryStatus::Ok => "ok",
            ExpiryStatus::NoExpiry => "no_expiry",
        }
    }
}

/// Check the quantity a movement carries is acceptable for its type
pub fn validate_quantity(movement_type: MovementType, quantity: Decimal) -> Result<(), BalanceError> {
    let valid = match movement_type {
        MovementType::In | MovementType::Out => quantity > Decimal::ZERO,
        MovementType::Adjustment | MovementType::Transfer => quantity >= Decimal::ZERO,
    };
    if valid {
        Ok(())
    } else {
        Err(BalanceError::InvalidQuantity {
            movement_type,
            quantity,
        })
    }
}

/// Balance after applying one movement.
///
/// `Adjustment` treats `quantity` as the recounted target rather than a delta;
/// `Transfer` leaves the balance untouched.
pub fn apply_movement(
    balance: Decimal,
    movement_type: MovementType,
    quantity: Decimal,
) -> Result<Decimal, BalanceError> {
    validate_quantity(movement_type, quantity)?;

    match movement_type {
        MovementType::In => Ok(balance + quantity),
        MovementType::Out => {
            if quantity > balance {
                return Err(BalanceError::InsufficientStock {
                    available: balance,
                    requested: quantity,
                });
            }
            Ok(balance - quantity)
        }
        MovementType::Adjustment => Ok(quantity),
        MovementType::Transfer => Ok(balance),
    }
}

/// Delta an adjustment to `target` applies to `balance_before`
pub fn adjustment_delta(balance_before: Decimal, target: Decimal) -> Decimal {
    target - balance_before
}

/// Rebuild a balance from zero by folding movements in commit order
pub fn replay<'a, I>(movements: I) -> Result<Decimal, BalanceError>
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    movements
        .into_iter()
        .try_fold(Decimal::ZERO, |balance, movement| {
            apply_movement(balance, movement.movement_type, movement.quantity)
        })
}

/// OutOfStock at zero, Low at or below the minimum, Normal otherwise
pub fn stock_status(current: Decimal, minimum: Decimal) -> StockStatus {
    if current <= Decimal::ZERO {
        StockStatus::OutOfStock
    } else if current <= minimum {
        StockStatus::Low
    } else {
        StockStatus::Normal
    }
}

/// Classify an expiration date against `today` and a look-ahead window
pub fn expiry_status(expiration: Option<NaiveDate>, today: NaiveDate, window_days: i64) -> ExpiryStatus {
    let Some(expiration) = expiration else {
        return ExpiryStatus::NoExpiry;
    };
    let days_left = (expiration - today).num_days();
    if days_left < 0 {
        ExpiryStatus::Expired
    } else if days_left <= window_days {
        ExpiryStatus::ExpiringSoon
    } else {
        ExpiryStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_in_and_out() {
        assert_eq!(apply_movement(d(5), MovementType::In, d(3)), Ok(d(8)));
        assert_eq!(apply_movement(d(5), MovementType::Out, d(5)), Ok(d(0)));
    }

    #[test]
    fn test_out_cannot_overdraw() {
        assert_eq!(
            apply_movement(d(5), MovementType::Out, d(10)),
            Err(BalanceError::InsufficientStock {
                available: d(5),
                requested: d(10),
            })
        );
    }

    #[test]
    fn test_adjustment_is_absolute() {
        assert_eq!(apply_movement(d(17), MovementType::Adjustment, d(5)), Ok(d(5)));
        assert_eq!(apply_movement(d(0), MovementType::Adjustment, d(5)), Ok(d(5)));
        assert_eq!(apply_movement(d(5), MovementType::Adjustment, d(0)), Ok(d(0)));
        assert_eq!(adjustment_delta(d(17), d(5)), d(-12));
    }

    #[test]
    fn test_transfer_keeps_balance() {
        assert_eq!(apply_movement(d(9), MovementType::Transfer, d(9)), Ok(d(9)));
    }

    #[test]
    fn test_zero_and_negative_quantities_rejected() {
        assert!(matches!(
            apply_movement(d(5), MovementType::In, d(0)),
            Err(BalanceError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            apply_movement(d(5), MovementType::Out, d(-1)),
            Err(BalanceError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            apply_movement(d(5), MovementType::Adjustment, d(-1)),
            Err(BalanceError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_status_thresholds() {
        let minimum = d(5);
        assert_eq!(stock_status(d(0), minimum), StockStatus::OutOfStock);
        assert_eq!(stock_status(d(3), minimum), StockStatus::Low);
        assert_eq!(stock_status(d(5), minimum), StockStatus::Low);
        assert_eq!(stock_status(d(6), minimum), StockStatus::Normal);
        assert_eq!(stock_status(d(1), Decimal::ZERO), StockStatus::Normal);
    }

    #[test]
    fn test_fractional_balances() {
        let balance = apply_movement(Decimal::new(25, 1), MovementType::Out, Decimal::new(5, 1));
        assert_eq!(balance, Ok(d(2)));
        assert_eq!(stock_status(Decimal::new(5, 1), d(1)), StockStatus::Low);
    }

    #[test]
    fn test_expiry_status() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let in_days = |n: i64| Some(today + chrono::Duration::days(n));

        assert_eq!(expiry_status(in_days(-1), today, 30), ExpiryStatus::Expired);
        assert_eq!(expiry_status(in_days(0), today, 30), ExpiryStatus::ExpiringSoon);
        assert_eq!(expiry_status(in_days(30), today, 30), ExpiryStatus::ExpiringSoon);
        assert_eq!(expiry_status(in_days(31), today, 30), ExpiryStatus::Ok);
        assert_eq!(expiry_status(None, today, 30), ExpiryStatus::NoExpiry);
    }

    fn op_strategy() -> impl Strategy<Value = (MovementType, Decimal)> {
        (
            prop_oneof![
                Just(MovementType::In),
                Just(MovementType::Out),
                Just(MovementType::Adjustment),
                Just(MovementType::Transfer),
            ],
            (0i64..=500i64).prop_map(|n| Decimal::new(n, 1)),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// No sequence of accepted movements ever yields a negative balance
        #[test]
        fn prop_balance_never_negative(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut balance = Decimal::ZERO;
            for (movement_type, quantity) in ops {
                if let Ok(next) = apply_movement(balance, movement_type, quantity) {
                    balance = next;
                }
                prop_assert!(balance >= Decimal::ZERO);
            }
        }

        /// A rejected movement leaves the balance where it was
        #[test]
        fn prop_rejection_is_side_effect_free(
            balance in (0i64..=100i64).prop_map(Decimal::from),
            extra in (1i64..=100i64).prop_map(Decimal::from)
        ) {
            let requested = balance + extra;
            let result = apply_movement(balance, MovementType::Out, requested);
            prop_assert_eq!(result, Err(BalanceError::InsufficientStock { available: balance, requested }));
        }

        /// Adjustment lands on its target regardless of the prior balance
        #[test]
        fn prop_adjustment_lands_on_target(
            before in (0i64..=10_000i64).prop_map(|n| Decimal::new(n, 2)),
            target in (0i64..=10_000i64).prop_map(|n| Decimal::new(n, 2))
        ) {
            prop_assert_eq!(apply_movement(before, MovementType::Adjustment, target), Ok(target));
            prop_assert_eq!(before + adjustment_delta(before, target), target);
        }

        /// Status is exactly one of the three classes and agrees with the thresholds
        #[test]
        fn prop_status_matches_thresholds(
            current in (0i64..=200i64).prop_map(Decimal::from),
            minimum in (0i64..=100i64).prop_map(Decimal::from)
        ) {
            let status = stock_status(current, minimum);
            if current == Decimal::ZERO {
                prop_assert_eq!(status, StockStatus::OutOfStock);
            } else if current <= minimum {
                prop_assert_eq!(status, StockStatus::Low);
            } else {
                prop_assert_eq!(status, StockStatus::Normal);
            }
        }
    }
}
