use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::bin::BinId;
use crate::entities::position::PositionId;
use crate::enums::OperationKind;

/// One confirmed add or remove transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: Uuid,
    pub kind: OperationKind,
    /// Strategy position this operation belongs to; manual operations have none.
    pub position_id: Option<PositionId>,
    pub bin_ids: Vec<BinId>,
    pub amount_x: Decimal,
    pub amount_y: Decimal,
    pub tx_hash: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl OperationRecord {
    pub fn new(kind: OperationKind, bin_ids: Vec<BinId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            position_id: None,
            bin_ids,
            amount_x: Decimal::ZERO,
            amount_y: Decimal::ZERO,
            tx_hash: None,
            recorded_at: Utc::now(),
            note: None,
        }
    }

    #[must_use]
    pub fn for_position(mut self, id: &PositionId) -> Self {
        self.position_id = Some(id.clone());
        self
    }

    #[must_use]
    pub fn with_amounts(mut self, amount_x: Decimal, amount_y: Decimal) -> Self {
        self.amount_x = amount_x;
        self.amount_y = amount_y;
        self
    }

    #[must_use]
    pub fn with_tx(mut self, tx_hash: Option<String>) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
