//! Lines of clinical records that draw on stock

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MovementReason, MovementReference, ReferenceKind};

/// Which clinical flow produced the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    Prescription,
    Antiparasitic,
}

impl ConsumerKind {
    pub fn reference_kind(&self) -> ReferenceKind {
        match self {
            ConsumerKind::Prescription => ReferenceKind::Prescription,
            ConsumerKind::Antiparasitic => ReferenceKind::Antiparasitic,
        }
    }

    pub fn reason(&self) -> MovementReason {
        match self {
            ConsumerKind::Prescription => MovementReason::Prescription,
            ConsumerKind::Antiparasitic => MovementReason::Antiparasitic,
        }
    }
}

/// A prescription medication line or an antiparasitic treatment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerLine {
    pub kind: ConsumerKind,
    /// Prescription or treatment id
    pub source_id: String,
    #[serde(default)]
    pub line_index: u32,
    /// Catalog match chosen in the form, if any
    pub stock_item_id: Option<Uuid>,
    /// Free-text product name, resolved against the catalog when no id is given
    pub product_name: String,
    pub quantity: Decimal,
    /// Operator opted to deduct this line from stock
    #[serde(default)]
    pub stock_deducted: bool,
}

impl ConsumerLine {
    pub fn reference(&self) -> MovementReference {
        MovementReference::new(self.kind.reference_kind(), self.source_id.clone())
            .with_line(self.line_index)
    }
}
