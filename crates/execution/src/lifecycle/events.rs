//! Lifecycle events for position tracking.

use lb_lp_domain::entities::{BinId, PositionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Type of lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEventType {
    /// Deposit confirmed and persisted.
    PositionOpened,
    /// Position marked WITHDRAWING.
    WithdrawStarted,
    /// Position closed.
    PositionClosed,
    /// Controller halted with this position in flight.
    Failed,
}

/// A lifecycle event for a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Event ID.
    pub id: String,
    /// Event type.
    pub event_type: LifecycleEventType,
    /// Position the event belongs to.
    pub position: PositionId,
    /// Pool address.
    pub pool: String,
    /// Transaction hash, when the event was caused by one.
    pub tx_hash: Option<String>,
    /// Timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Event-specific data.
    pub data: EventData,
}

impl LifecycleEvent {
    /// Creates a new lifecycle event.
    pub fn new(
        event_type: LifecycleEventType,
        position: PositionId,
        pool: impl Into<String>,
        data: EventData,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            position,
            pool: pool.into(),
            tx_hash: None,
            timestamp: chrono::Utc::now(),
            data,
        }
    }

    /// Sets the transaction hash.
    #[must_use]
    pub fn with_tx_hash(mut self, tx_hash: Option<String>) -> Self {
        self.tx_hash = tx_hash;
        self
    }
}

/// Event-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventData {
    /// Position opened data.
    PositionOpened(PositionOpenedData),
    /// Withdrawal data.
    WithdrawStarted(WithdrawStartedData),
    /// Position closed data.
    PositionClosed(PositionClosedData),
    /// Failure data.
    Failed(FailureData),
}

/// Data for position opened event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedData {
    /// Active bin the plan was built around.
    pub active_bin: BinId,
    /// Bins holding the deposit.
    pub bin_ids: Vec<BinId>,
    /// Asset X deposited.
    pub amount_x: Decimal,
    /// Asset Y deposited.
    pub amount_y: Decimal,
}

/// Data for withdraw started event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawStartedData {
    /// Active bin when the withdrawal began, if known.
    pub active_bin: Option<BinId>,
    /// Drift outside the position span, if measured.
    pub distance: Option<u32>,
    /// Reason for withdrawing.
    pub reason: WithdrawReason,
}

/// Reason for withdrawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawReason {
    /// Active bin left the tolerated range.
    RangeExit,
    /// Position had no bins to evaluate.
    EmptyPosition,
    /// Operator requested a withdraw-all.
    Manual,
    /// Interrupted withdrawal picked up at startup.
    Resumed,
}

/// Data for position closed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedData {
    /// Bins the position covered.
    pub bin_ids: Vec<BinId>,
    /// Reason for closing.
    pub reason: CloseReason,
}

/// Reason for closing a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Withdrawn by the controller ahead of a redeploy.
    Rebalance,
    /// Withdrawn on operator request.
    Manual,
    /// Shares were already gone when the removal was attempted.
    AlreadyWithdrawn,
    /// Shares disappeared outside the controller.
    ExternalWithdrawal,
    /// A pending deposit never landed.
    NeverLanded,
}

/// Data for failure event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureData {
    /// Controller phase when the failure happened.
    pub phase: String,
    /// Error that caused the halt.
    pub reason: String,
}
