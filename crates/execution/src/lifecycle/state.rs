//! Controller state owned by the caller and threaded through each tick.

use std::fmt;

use lb_lp_data::StoreError;
use lb_lp_domain::DomainError;
use lb_lp_domain::entities::{ActiveBinSnapshot, Position, PositionId, PositionPlan};
use lb_lp_protocols::ChainError;
use thiserror::Error;

use super::{CloseReason, WithdrawReason};

/// Phase of the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    /// No position; the next tick plans and deploys.
    Idle,
    /// PENDING position persisted, deposit not yet persisted as ACTIVE.
    Deploying,
    /// Position ACTIVE and watched for drift.
    Active,
    /// Position WITHDRAWING; removal not yet persisted as CLOSED.
    Withdrawing,
    /// Halted until the operator intervenes.
    Failed,
}

impl fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerPhase::Idle => "IDLE",
            ControllerPhase::Deploying => "DEPLOYING",
            ControllerPhase::Active => "ACTIVE",
            ControllerPhase::Withdrawing => "WITHDRAWING",
            ControllerPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// In-flight deposit.
#[derive(Debug, Clone)]
pub struct DeployAttempt {
    pub plan: PositionPlan,
    /// A transaction may have been broadcast.
    pub submitted: bool,
    /// The deposit is known to have landed.
    pub confirmed: bool,
    pub tx_hash: Option<String>,
}

impl DeployAttempt {
    pub fn new(plan: PositionPlan) -> Self {
        Self {
            plan,
            submitted: false,
            confirmed: false,
            tx_hash: None,
        }
    }
}

/// In-flight removal.
#[derive(Debug, Clone)]
pub struct WithdrawAttempt {
    pub reason: WithdrawReason,
    /// Deploy a fresh plan once the position is closed.
    pub redeploy: bool,
    pub submitted: bool,
    pub confirmed: bool,
    pub tx_hash: Option<String>,
    pub close_reason: Option<CloseReason>,
}

impl WithdrawAttempt {
    pub fn new(reason: WithdrawReason, redeploy: bool) -> Self {
        Self {
            reason,
            redeploy,
            submitted: false,
            confirmed: false,
            tx_hash: None,
            close_reason: None,
        }
    }
}

/// Everything the controller knows between ticks.
#[derive(Debug, Clone)]
pub struct StrategyState {
    pub phase: ControllerPhase,
    /// The pool's open position, mirrored from the store.
    pub position: Option<Position>,
    pub deploy: Option<DeployAttempt>,
    pub withdraw: Option<WithdrawAttempt>,
    /// Most recent pool observation.
    pub last_snapshot: Option<ActiveBinSnapshot>,
    /// Why the controller halted.
    pub failure: Option<String>,
    /// The failure marker has not reached the store yet.
    pub failure_unsaved: bool,
}

impl StrategyState {
    pub fn idle() -> Self {
        Self {
            phase: ControllerPhase::Idle,
            position: None,
            deploy: None,
            withdraw: None,
            last_snapshot: None,
            failure: None,
            failure_unsaved: false,
        }
    }

    pub fn active(position: Position) -> Self {
        Self {
            phase: ControllerPhase::Active,
            position: Some(position),
            ..Self::idle()
        }
    }

    /// Resumes an interrupted removal; the position is redeployed afterwards.
    pub fn withdrawing(position: Position) -> Self {
        Self {
            phase: ControllerPhase::Withdrawing,
            position: Some(position),
            withdraw: Some(WithdrawAttempt::new(WithdrawReason::Resumed, true)),
            ..Self::idle()
        }
    }

    pub fn failed(position: Option<Position>, reason: impl Into<String>) -> Self {
        Self {
            phase: ControllerPhase::Failed,
            position,
            failure: Some(reason.into()),
            ..Self::idle()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase == ControllerPhase::Failed
    }
}

impl Default for StrategyState {
    fn default() -> Self {
        Self::idle()
    }
}

/// What a tick (or a manual command) ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Position within tolerance.
    Held { distance: u32 },
    /// A new position is ACTIVE.
    Deployed { position_id: PositionId },
    /// Position closed without redeploying.
    Withdrawn { position_id: PositionId },
    /// Manual withdraw with no open position.
    NothingToWithdraw,
    /// Nothing spendable; stays IDLE.
    InsufficientBalance,
    /// The tracked position is not ACTIVE.
    NotActive,
    /// A chain read kept failing; state unchanged.
    Skipped { reason: String },
    /// The controller entered FAILED during this call.
    Failed { reason: String },
    /// The controller was already FAILED.
    Halted,
}

impl TickOutcome {
    /// The executor must stop after this outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TickOutcome::Failed { .. } | TickOutcome::Halted)
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("controller is halted: {0}")]
    Halted(String),
    #[error("operation not allowed while {0}")]
    Busy(ControllerPhase),
    #[error("inconsistent controller state: {0}")]
    Inconsistent(String),
}
