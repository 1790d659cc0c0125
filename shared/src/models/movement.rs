//! Stock movement ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of quantity-changing event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Adds `quantity` to the balance
    In,
    /// Removes `quantity` from the balance
    Out,
    /// Sets the balance to `quantity` (recount)
    Adjustment,
    /// Location change; the balance is carried unchanged
    Transfer,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementType::In),
            "out" => Some(MovementType::Out),
            "adjustment" => Some(MovementType::Adjustment),
            "transfer" => Some(MovementType::Transfer),
            _ => None,
        }
    }

    /// The compensating type for `reverse`, if any
    pub fn inverse(&self) -> Option<MovementType> {
        match self {
            MovementType::In => Some(MovementType::Out),
            MovementType::Out => Some(MovementType::In),
            MovementType::Adjustment | MovementType::Transfer => None,
        }
    }
}

/// Enumerated reason codes recorded on each movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    InitialStock,
    Purchase,
    Return,
    Prescription,
    Antiparasitic,
    Consumption,
    Sale,
    Recount,
    Correction,
    Loss,
    Expired,
    Transfer,
    Reversal,
    Other,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::InitialStock => "initial_stock",
            MovementReason::Purchase => "purchase",
            MovementReason::Return => "return",
            MovementReason::Prescription => "prescription",
            MovementReason::Antiparasitic => "antiparasitic",
            MovementReason::Consumption => "consumption",
            MovementReason::Sale => "sale",
            MovementReason::Recount => "recount",
            MovementReason::Correction => "correction",
            MovementReason::Loss => "loss",
            MovementReason::Expired => "expired",
            MovementReason::Transfer => "transfer",
            MovementReason::Reversal => "reversal",
            MovementReason::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initial_stock" => Some(MovementReason::InitialStock),
            "purchase" => Some(MovementReason::Purchase),
            "return" => Some(MovementReason::Return),
            "prescription" => Some(MovementReason::Prescription),
            "antiparasitic" => Some(MovementReason::Antiparasitic),
            "consumption" => Some(MovementReason::Consumption),
            "sale" => Some(MovementReason::Sale),
            "recount" => Some(MovementReason::Recount),
            "correction" => Some(MovementReason::Correction),
            "loss" => Some(MovementReason::Loss),
            "expired" => Some(MovementReason::Expired),
            "transfer" => Some(MovementReason::Transfer),
            "reversal" => Some(MovementReason::Reversal),
            "other" => Some(MovementReason::Other),
            _ => None,
        }
    }
}

/// What kind of external record caused a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Prescription,
    Antiparasitic,
    Invoice,
    Manual,
    Reversal,
    Other,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Prescription => "prescription",
            ReferenceKind::Antiparasitic => "antiparasitic",
            ReferenceKind::Invoice => "invoice",
            ReferenceKind::Manual => "manual",
            ReferenceKind::Reversal => "reversal",
            ReferenceKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "prescription" => Some(ReferenceKind::Prescription),
            "antiparasitic" => Some(ReferenceKind::Antiparasitic),
            "invoice" => Some(ReferenceKind::Invoice),
            "manual" => Some(ReferenceKind::Manual),
            "reversal" => Some(ReferenceKind::Reversal),
            "other" => Some(ReferenceKind::Other),
            _ => None,
        }
    }
}

/// External identity a movement is causally tied to, e.g. a prescription line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    pub kind: ReferenceKind,
    pub id: String,
    /// Line within the referenced record (medication line index)
    pub line: Option<u32>,
}

impl MovementReference {
    pub fn new(kind: ReferenceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            line: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Reference to a prescription medication line
    pub fn prescription_line(prescription_id: impl Into<String>, line: u32) -> Self {
        Self::new(ReferenceKind::Prescription, prescription_id).with_line(line)
    }

    /// Reference pointing back at a reversed movement
    pub fn reversal_of(movement_id: Uuid) -> Self {
        Self::new(ReferenceKind::Reversal, movement_id.to_string())
    }

    /// Key that makes a replay of the same consumer action a no-op.
    ///
    /// Scoped by movement type so that, e.g., a return recorded against a
    /// prescription does not collide with the dispense of that prescription.
    /// The item is not part of the key: a line re-pointed at another catalog
    /// entry still replays the movement it produced first.
    pub fn idempotency_key(&self, movement_type: MovementType) -> String {
        match self.line {
            Some(line) => format!(
                "{}/{}:{}:{}",
                movement_type.as_str(),
                self.kind.as_str(),
                self.id,
                line
            ),
            None => format!("{}/{}:{}", movement_type.as_str(), self.kind.as_str(), self.id),
        }
    }
}

impl std::fmt::Display for MovementReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}#{}", self.kind.as_str(), self.id, line),
            None => write!(f, "{}:{}", self.kind.as_str(), self.id),
        }
    }
}

/// A committed, immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    /// Commit order; strictly increasing
    pub sequence: i64,
    pub stock_item_id: Uuid,
    pub movement_type: MovementType,
    /// Magnitude for in/out, target balance for adjustments, carried balance for transfers
    pub quantity: Decimal,
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

impl StockMovement {
    /// Signed change this movement applied to the balance
    pub fn delta(&self) -> Decimal {
        self.balance_after - self.balance_before
    }
}

/// Time window for ledger queries; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_inverse_types() {
        assert_eq!(MovementType::In.inverse(), Some(MovementType::Out));
        assert_eq!(MovementType::Out.inverse(), Some(MovementType::In));
        assert_eq!(MovementType::Adjustment.inverse(), None);
        assert_eq!(MovementType::Transfer.inverse(), None);
    }

    #[test]
    fn test_idempotency_key_includes_line_and_type() {
        let line0 = MovementReference::prescription_line("rx-1", 0);
        let line1 = MovementReference::prescription_line("rx-1", 1);

        assert_ne!(
            line0.idempotency_key(MovementType::Out),
            line1.idempotency_key(MovementType::Out)
        );
        assert_ne!(
            line0.idempotency_key(MovementType::Out),
            line0.idempotency_key(MovementType::In)
        );
        assert_eq!(line0.idempotency_key(MovementType::Out), "out/prescription:rx-1:0");
        assert_eq!(
            MovementReference::new(ReferenceKind::Invoice, "INV-7").idempotency_key(MovementType::In),
            "in/invoice:INV-7"
        );
    }

    #[test]
    fn test_reference_display() {
        let reference = MovementReference::prescription_line("rx-9", 2);
        assert_eq!(reference.to_string(), "prescription:rx-9#2");
        let invoice = MovementReference::new(ReferenceKind::Invoice, "INV-77");
        assert_eq!(invoice.to_string(), "invoice:INV-77");
    }

    #[test]
    fn test_time_range_bounds() {
        let now = Utc::now();
        let range = TimeRange {
            from: Some(now - Duration::days(1)),
            to: Some(now),
        };
        assert!(range.contains(now));
        assert!(!range.contains(now + Duration::seconds(1)));
        assert!(TimeRange::all().contains(now - Duration::days(3650)));
    }

    #[test]
    fn test_reason_codes_parse() {
        for reason in [
            MovementReason::InitialStock,
            MovementReason::Prescription,
            MovementReason::Recount,
            MovementReason::Reversal,
        ] {
            assert_eq!(MovementReason::from_str(reason.as_str()), Some(reason));
        }
    }
}
