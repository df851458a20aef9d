use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::bin::BinId;
use crate::enums::Asset;
use crate::value_objects::bin_span::BinSpan;

/// A single deposit of one asset into one bin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBin {
    pub bin_id: BinId,
    pub asset: Asset,
    pub amount: Decimal,
}

/// Target layout for a new deployment, relative to the active bin it was
/// computed from. Bins are kept in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionPlan {
    pub active_bin: BinId,
    pub bins: Vec<PlannedBin>,
}

impl PositionPlan {
    pub fn new(active_bin: BinId, mut bins: Vec<PlannedBin>) -> Self {
        bins.sort_by_key(|b| b.bin_id);
        Self { active_bin, bins }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bin_ids(&self) -> Vec<BinId> {
        let mut ids: Vec<BinId> = self.bins.iter().map(|b| b.bin_id).collect();
        ids.dedup();
        ids
    }

    pub fn total(&self, asset: Asset) -> Decimal {
        self.bins
            .iter()
            .filter(|b| b.asset == asset)
            .map(|b| b.amount)
            .sum()
    }

    pub fn span(&self) -> Option<BinSpan> {
        BinSpan::from_ids(self.bins.iter().map(|b| b.bin_id))
    }

    /// Signed offset of `bin_id` from the plan's active bin.
    pub fn delta_of(&self, bin_id: BinId) -> i64 {
        i64::from(bin_id) - i64::from(self.active_bin)
    }
}
