//! Strategy executor for automated position management.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_CHECK_INTERVAL;
use crate::lifecycle::{LifecycleController, StrategyState, TickOutcome};

/// Configuration for strategy execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Period between ticks.
    pub check_interval: Duration,
    /// Transactions are journaled instead of broadcast.
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            dry_run: false,
        }
    }
}

/// Why the run loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown signal fired.
    Shutdown,
    /// The controller halted in FAILED.
    Failed(String),
    /// [`StrategyExecutor::stop`] was called.
    Stopped,
}

/// Runs the lifecycle controller on a fixed period.
pub struct StrategyExecutor {
    controller: Arc<LifecycleController>,
    config: ExecutorConfig,
    running: AtomicBool,
}

impl StrategyExecutor {
    pub fn new(controller: Arc<LifecycleController>, config: ExecutorConfig) -> Self {
        Self {
            controller,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// Ticks until shutdown, stop, or a FAILED controller.
    ///
    /// The shutdown future is only raced against the wait between ticks, so
    /// a tick that has submitted a transaction always runs to completion.
    pub async fn run<S>(&self, state: &mut StrategyState, shutdown: S) -> StopReason
    where
        S: Future<Output = ()>,
    {
        self.running.store(true, Ordering::SeqCst);
        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.config.check_interval.as_secs(),
            dry_run = self.config.dry_run,
            phase = %state.phase,
            "Starting strategy executor"
        );

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => break StopReason::Shutdown,
                _ = ticker.tick() => {}
            }
            if !self.running.load(Ordering::SeqCst) {
                break StopReason::Stopped;
            }

            match self.controller.tick(state).await {
                Ok(outcome) => {
                    debug!(outcome = ?outcome, phase = %state.phase, "Tick complete");
                    if outcome.is_terminal() {
                        let reason = match outcome {
                            TickOutcome::Failed { reason } => reason,
                            _ => state.failure.clone().unwrap_or_default(),
                        };
                        break StopReason::Failed(reason);
                    }
                }
                Err(e) => {
                    error!(error = %e, phase = %state.phase, "Tick failed, retrying next period");
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break StopReason::Stopped;
            }
        };

        self.running.store(false, Ordering::SeqCst);
        match &reason {
            StopReason::Failed(why) => warn!(reason = %why, "Strategy executor halted"),
            _ => info!(reason = ?reason, "Strategy executor stopped"),
        }
        reason
    }

    /// Stops the loop after the current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
