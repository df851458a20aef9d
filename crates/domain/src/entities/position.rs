use chrono::{DateTime, Utc};
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::entities::bin::BinId;
use crate::entities::plan::PositionPlan;
use crate::enums::{Asset, PositionStatus};
use crate::error::DomainError;
use crate::value_objects::bin_span::BinSpan;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub Uuid);

impl PositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strategy position as persisted by the position store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub pool_address: String,
    pub owner_address: String,

    pub bin_ids: BTreeSet<BinId>,

    pub asset_x_amount: Decimal,
    pub asset_y_amount: Decimal,

    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,

    /// Hash of the last transaction submitted for this position.
    pub last_tx_hash: Option<String>,
    /// Set when the controller halted while this position was in flight.
    pub failure: Option<String>,
    /// Operator shares already held in `bin_ids` before the deposit was
    /// submitted.
    #[serde(default)]
    pub share_baseline: BTreeMap<BinId, U256>,
}

impl Position {
    /// Creates a PENDING position mirroring `plan`.
    pub fn pending(
        pool_address: impl Into<String>,
        owner_address: impl Into<String>,
        plan: &PositionPlan,
    ) -> Self {
        Self {
            id: PositionId::new(),
            pool_address: pool_address.into(),
            owner_address: owner_address.into(),
            bin_ids: plan.bin_ids().into_iter().collect(),
            asset_x_amount: plan.total(Asset::X),
            asset_y_amount: plan.total(Asset::Y),
            status: PositionStatus::Pending,
            opened_at: Utc::now(),
            closed_at: None,
            last_tx_hash: None,
            failure: None,
            share_baseline: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_share_baseline(mut self, baseline: BTreeMap<BinId, U256>) -> Self {
        self.share_baseline = baseline;
        self
    }

    /// Whether `shares` show the deposit landed: some bin holds more than it
    /// did before submission.
    pub fn gained_shares(&self, shares: &BTreeMap<BinId, U256>) -> bool {
        self.bin_ids.iter().any(|bin| {
            let now = shares.get(bin).copied().unwrap_or_default();
            let before = self.share_baseline.get(bin).copied().unwrap_or_default();
            now > before
        })
    }

    pub fn span(&self) -> Option<BinSpan> {
        BinSpan::from_ids(self.bin_ids.iter().copied())
    }

    pub fn bin_ids_vec(&self) -> Vec<BinId> {
        self.bin_ids.iter().copied().collect()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn transition(&mut self, next: PositionStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// PENDING -> ACTIVE once the deposit is confirmed.
    pub fn activate(&mut self, tx_hash: Option<String>) -> Result<(), DomainError> {
        self.transition(PositionStatus::Active)?;
        if tx_hash.is_some() {
            self.last_tx_hash = tx_hash;
        }
        Ok(())
    }

    /// ACTIVE -> WITHDRAWING before the removal is submitted.
    pub fn begin_withdraw(&mut self) -> Result<(), DomainError> {
        self.transition(PositionStatus::Withdrawing)
    }

    /// Any open status -> CLOSED.
    pub fn close(&mut self, tx_hash: Option<String>) -> Result<(), DomainError> {
        self.transition(PositionStatus::Closed)?;
        self.closed_at = Some(Utc::now());
        if tx_hash.is_some() {
            self.last_tx_hash = tx_hash;
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    pub fn clear_failure(&mut self) {
        self.failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::plan::PlannedBin;
    use rust_decimal_macros::dec;

    fn plan() -> PositionPlan {
        PositionPlan::new(
            100,
            vec![
                PlannedBin {
                    bin_id: 101,
                    asset: Asset::X,
                    amount: dec!(5),
                },
                PlannedBin {
                    bin_id: 99,
                    asset: Asset::Y,
                    amount: dec!(0.1),
                },
            ],
        )
    }

    #[test]
    fn test_pending_position_mirrors_plan() {
        let position = Position::pending("pool", "owner", &plan());
        assert_eq!(position.status, PositionStatus::Pending);
        assert_eq!(position.bin_ids_vec(), vec![99, 101]);
        assert_eq!(position.asset_x_amount, dec!(5));
        assert_eq!(position.asset_y_amount, dec!(0.1));
        assert_eq!(position.span(), Some(BinSpan::new(99, 101)));
        assert!(position.closed_at.is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut position = Position::pending("pool", "owner", &plan());
        position.activate(Some("0xabc".to_string())).unwrap();
        position.begin_withdraw().unwrap();
        position.close(None).unwrap();

        assert_eq!(position.status, PositionStatus::Closed);
        assert!(position.closed_at.is_some());
        assert_eq!(position.last_tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_rejects_skipping_states() {
        let mut position = Position::pending("pool", "owner", &plan());
        let err = position.begin_withdraw().unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: PositionStatus::Pending,
                to: PositionStatus::Withdrawing,
            }
        );
        assert_eq!(position.status, PositionStatus::Pending);
    }

    #[test]
    fn test_gained_shares_compares_against_baseline() {
        let baseline = BTreeMap::from([(101, U256::from(40))]);
        let position = Position::pending("pool", "owner", &plan()).with_share_baseline(baseline);

        let unchanged = BTreeMap::from([(101, U256::from(40)), (99, U256::zero())]);
        assert!(!position.gained_shares(&unchanged));

        let deposited = BTreeMap::from([(101, U256::from(40)), (99, U256::from(7))]);
        assert!(position.gained_shares(&deposited));
    }
}
