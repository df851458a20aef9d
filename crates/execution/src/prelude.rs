//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use lb_lp_execution::prelude::*;
//! ```

// Config
pub use crate::config::{ConfigError, StrategyConfig};

// Lifecycle
pub use crate::lifecycle::{
    AggregateStats, CloseReason, ControllerError, ControllerPhase, EventData, LifecycleController,
    LifecycleEvent, LifecycleEventType, LifecycleTracker, PositionClosedData, PositionOpenedData,
    PositionSummary, StrategyState, TickOutcome, WithdrawReason,
};

// Retry
pub use crate::retry::{RetryPolicy, Transient};

// Strategy
pub use crate::strategy::{
    BinPlanner, Decision, DecisionEngine, ExecutorConfig, PlanError, StopReason,
    StrategyExecutor,
};

// Sync
pub use crate::sync::{ReconcileResult, ReconcileStatus, Reconciler};
