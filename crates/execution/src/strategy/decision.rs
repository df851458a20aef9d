//! Rebalance decision engine.

use lb_lp_domain::entities::{ActiveBinSnapshot, Position};
use lb_lp_domain::enums::PositionStatus;
use lb_lp_domain::value_objects::RebalanceThreshold;

/// Outcome of evaluating a position against the active bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Active bin is within tolerance of the position.
    Hold { distance: u32 },
    /// Active bin drifted at least the threshold away.
    Rebalance { distance: u32 },
    /// The position is not ACTIVE; callers warn instead of acting.
    NotActive { status: PositionStatus },
    /// The position covers no bins.
    Empty,
}

impl Decision {
    pub fn requires_rebalance(&self) -> bool {
        !matches!(self, Decision::Hold { .. })
    }
}

/// Classifies `position` against the snapshot's active bin.
pub fn evaluate(
    position: &Position,
    snapshot: &ActiveBinSnapshot,
    threshold: RebalanceThreshold,
) -> Decision {
    let Some(span) = position.span() else {
        return Decision::Empty;
    };
    if position.status != PositionStatus::Active {
        return Decision::NotActive {
            status: position.status,
        };
    }
    let distance = span.distance_to(snapshot.bin_id);
    if distance >= threshold.bins() {
        Decision::Rebalance { distance }
    } else {
        Decision::Hold { distance }
    }
}

pub fn should_rebalance(
    position: &Position,
    snapshot: &ActiveBinSnapshot,
    threshold: RebalanceThreshold,
) -> bool {
    evaluate(position, snapshot, threshold).requires_rebalance()
}

/// [`evaluate`] bound to a configured threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine {
    threshold: RebalanceThreshold,
}

impl DecisionEngine {
    pub fn new(threshold: RebalanceThreshold) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> RebalanceThreshold {
        self.threshold
    }

    pub fn decide(&self, position: &Position, snapshot: &ActiveBinSnapshot) -> Decision {
        evaluate(position, snapshot, self.threshold)
    }
}
