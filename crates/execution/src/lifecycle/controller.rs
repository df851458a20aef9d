//! Position lifecycle controller.
//!
//! One call to [`LifecycleController::tick`] advances the state machine until
//! it reaches a resting point: holding an ACTIVE position, staying IDLE, or
//! halting in FAILED. Every persisted transition is written before the next
//! transaction is submitted.

use std::future::Future;
use std::sync::Arc;

use lb_lp_data::PositionStore;
use lb_lp_domain::entities::{BinId, OperationRecord, Position};
use lb_lp_domain::enums::OperationKind;
use lb_lp_protocols::{ChainError, ChainReader, ChainWriter, TxReceipt};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{
    CloseReason, ControllerError, ControllerPhase, DeployAttempt, FailureData, LifecycleTracker,
    PositionClosedData, PositionOpenedData, StrategyState, TickOutcome, WithdrawAttempt,
    WithdrawReason, WithdrawStartedData,
};
use crate::config::StrategyConfig;
use crate::retry::RetryPolicy;
use crate::strategy::{BinPlanner, Decision, DecisionEngine, PlanError};
use crate::sync::{ReconcileResult, Reconciler};

/// Upper bound on state transitions within one tick.
const MAX_STEPS_PER_TICK: usize = 8;

enum Step {
    Continue,
    Done(TickOutcome),
}

/// Drives a single strategy position through deploy, watch and rebalance.
pub struct LifecycleController {
    /// Pair state source.
    reader: Arc<dyn ChainReader>,
    /// Transaction sink.
    writer: Arc<dyn ChainWriter>,
    /// Durable position record.
    store: Arc<dyn PositionStore>,
    /// Placement of new deposits.
    planner: BinPlanner,
    /// Drift evaluation.
    decision: DecisionEngine,
    /// Backoff for reads and submissions.
    retry: RetryPolicy,
    /// Startup reconciliation.
    reconciler: Reconciler,
    /// Event history for this process.
    tracker: Arc<LifecycleTracker>,
    pool_address: String,
    owner_address: String,
}

impl LifecycleController {
    pub fn new(
        config: &StrategyConfig,
        reader: Arc<dyn ChainReader>,
        writer: Arc<dyn ChainWriter>,
        store: Arc<dyn PositionStore>,
    ) -> Self {
        let reconciler = Reconciler::new(config, reader.clone(), store.clone());
        Self {
            reader,
            writer,
            store,
            planner: BinPlanner::from_config(config),
            decision: DecisionEngine::new(config.rebalance_threshold),
            retry: config.retry.clone(),
            reconciler,
            tracker: Arc::new(LifecycleTracker::new()),
            pool_address: config.pool_address.clone(),
            owner_address: config.owner_address.clone(),
        }
    }

    /// Gets the lifecycle tracker.
    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        &self.tracker
    }

    /// Rebuilds the state from the store and the chain.
    ///
    /// # Errors
    /// Fails when the store cannot be read or written, or when the chain
    /// cannot be read after retries.
    pub async fn resume(&self) -> Result<ReconcileResult, ControllerError> {
        self.reconciler.reconcile().await
    }

    /// Advances the state machine once.
    ///
    /// # Errors
    /// Returns `ControllerError::Store` when a transition could not be
    /// persisted; `state` then still describes the last durable step and the
    /// next tick retries it before submitting anything new.
    pub async fn tick(&self, state: &mut StrategyState) -> Result<TickOutcome, ControllerError> {
        if state.is_failed() {
            if state.failure_unsaved {
                self.persist_failure(state).await?;
            }
            warn!(
                failure = state.failure.as_deref().unwrap_or("unknown"),
                "Controller is FAILED, operator action required"
            );
            return Ok(TickOutcome::Halted);
        }
        self.drive(state).await
    }

    /// Closes the current position without redeploying.
    ///
    /// # Errors
    /// Refuses while FAILED or while a deposit is in flight.
    pub async fn withdraw_all(
        &self,
        state: &mut StrategyState,
    ) -> Result<TickOutcome, ControllerError> {
        match state.phase {
            ControllerPhase::Failed => Err(ControllerError::Halted(
                state.failure.clone().unwrap_or_default(),
            )),
            ControllerPhase::Deploying => Err(ControllerError::Busy(ControllerPhase::Deploying)),
            ControllerPhase::Idle => {
                info!("No open position to withdraw");
                Ok(TickOutcome::NothingToWithdraw)
            }
            ControllerPhase::Active => {
                self.begin_withdraw(state, WithdrawReason::Manual, None, None, false)
                    .await?;
                self.drive(state).await
            }
            ControllerPhase::Withdrawing => {
                let attempt = state
                    .withdraw
                    .get_or_insert_with(|| WithdrawAttempt::new(WithdrawReason::Manual, false));
                attempt.redeploy = false;
                self.drive(state).await
            }
        }
    }

    async fn drive(&self, state: &mut StrategyState) -> Result<TickOutcome, ControllerError> {
        for _ in 0..MAX_STEPS_PER_TICK {
            let step = match state.phase {
                ControllerPhase::Idle => self.step_idle(state).await?,
                ControllerPhase::Deploying => self.step_deploying(state).await?,
                ControllerPhase::Active => self.step_active(state).await?,
                ControllerPhase::Withdrawing => self.step_withdrawing(state).await?,
                ControllerPhase::Failed => Step::Done(TickOutcome::Failed {
                    reason: state.failure.clone().unwrap_or_default(),
                }),
            };
            if let Step::Done(outcome) = step {
                return Ok(outcome);
            }
        }
        Err(ControllerError::Inconsistent(format!(
            "tick did not settle, last phase {}",
            state.phase
        )))
    }

    async fn step_idle(&self, state: &mut StrategyState) -> Result<Step, ControllerError> {
        let snapshot = match self.read("snapshot", || self.reader.snapshot()).await {
            Ok(snapshot) => snapshot,
            Err(err) => return self.read_failed(state, "snapshot", err).await,
        };
        let balances = match self
            .read("wallet_balances", || self.reader.wallet_balances())
            .await
        {
            Ok(balances) => balances,
            Err(err) => return self.read_failed(state, "wallet_balances", err).await,
        };
        state.last_snapshot = Some(snapshot.clone());

        let plan = match self.planner.plan(snapshot.bin_id, &balances) {
            Ok(plan) => plan,
            Err(PlanError::InsufficientBalance { x, y }) => {
                info!(
                    active_bin = snapshot.bin_id,
                    spendable_x = %x,
                    spendable_y = %y,
                    "Insufficient balance to deploy, staying idle"
                );
                return Ok(Step::Done(TickOutcome::InsufficientBalance));
            }
            Err(err) => return self.fail(state, err.to_string()).await,
        };

        let bins = plan.bin_ids();
        let baseline = match self
            .read("user_bin_balances", || self.reader.user_bin_balances(&bins))
            .await
        {
            Ok(shares) => shares,
            Err(err) => return self.read_failed(state, "user_bin_balances", err).await,
        };

        let position = Position::pending(&self.pool_address, &self.owner_address, &plan)
            .with_share_baseline(baseline);
        self.store.insert(&position).await?;
        info!(
            position = %position.id,
            active_bin = plan.active_bin,
            bins = ?bins,
            amount_x = %position.asset_x_amount,
            amount_y = %position.asset_y_amount,
            "Deploying position"
        );

        state.phase = ControllerPhase::Deploying;
        state.position = Some(position);
        state.deploy = Some(DeployAttempt::new(plan));
        Ok(Step::Continue)
    }

    async fn step_deploying(&self, state: &mut StrategyState) -> Result<Step, ControllerError> {
        let (Some(position), Some(attempt)) = (state.position.clone(), state.deploy.clone())
        else {
            return Err(ControllerError::Inconsistent(
                "DEPLOYING without a plan".to_string(),
            ));
        };

        if attempt.confirmed {
            return self.finish_deploy(state).await;
        }

        if attempt.submitted {
            match self.deposit_landed(&position).await {
                Ok(true) => {
                    info!("Earlier deposit found on-chain");
                    mark_deploy_confirmed(state, attempt.tx_hash.clone());
                    return self.finish_deploy(state).await;
                }
                Ok(false) => {}
                Err(err) => return self.read_failed(state, "user_bin_balances", err).await,
            }
        }

        if let Some(deploy) = state.deploy.as_mut() {
            deploy.submitted = true;
        }
        let result = self
            .submit(
                "add_liquidity",
                || self.writer.add_liquidity(&attempt.plan),
                || self.deposit_landed(&position),
            )
            .await;

        match result {
            Ok(tx_hash) => {
                mark_deploy_confirmed(state, tx_hash);
                self.finish_deploy(state).await
            }
            Err(err) => self.fail(state, format!("add_liquidity failed: {err}")).await,
        }
    }

    async fn finish_deploy(&self, state: &mut StrategyState) -> Result<Step, ControllerError> {
        let (Some(mut position), Some(attempt)) = (state.position.clone(), state.deploy.clone())
        else {
            return Err(ControllerError::Inconsistent(
                "confirmed deposit without a position".to_string(),
            ));
        };

        position.activate(attempt.tx_hash.clone())?;
        if let Err(err) = self.store.update(&position).await {
            error!(
                position = %position.id,
                error = %err,
                "Deposit confirmed but not persisted, will retry"
            );
            return Err(err.into());
        }

        self.record_operation(
            OperationRecord::new(OperationKind::Add, position.bin_ids_vec())
                .for_position(&position.id)
                .with_amounts(position.asset_x_amount, position.asset_y_amount)
                .with_tx(attempt.tx_hash.clone()),
        )
        .await;
        self.tracker
            .record_position_opened(
                &position.id,
                &self.pool_address,
                attempt.tx_hash.clone(),
                PositionOpenedData {
                    active_bin: attempt.plan.active_bin,
                    bin_ids: position.bin_ids_vec(),
                    amount_x: position.asset_x_amount,
                    amount_y: position.asset_y_amount,
                },
            )
            .await;

        let position_id = position.id.clone();
        state.phase = ControllerPhase::Active;
        state.position = Some(position);
        state.deploy = None;
        Ok(Step::Done(TickOutcome::Deployed { position_id }))
    }

    async fn step_active(&self, state: &mut StrategyState) -> Result<Step, ControllerError> {
        let Some(position) = state.position.clone() else {
            return Err(ControllerError::Inconsistent(
                "ACTIVE without a position".to_string(),
            ));
        };
        let snapshot = match self.read("snapshot", || self.reader.snapshot()).await {
            Ok(snapshot) => snapshot,
            Err(err) => return self.read_failed(state, "snapshot", err).await,
        };
        state.last_snapshot = Some(snapshot.clone());

        match self.decision.decide(&position, &snapshot) {
            Decision::Hold { distance } => {
                debug!(
                    position = %position.id,
                    active_bin = snapshot.bin_id,
                    distance,
                    "Holding position"
                );
                Ok(Step::Done(TickOutcome::Held { distance }))
            }
            Decision::NotActive { status } => {
                warn!(
                    position = %position.id,
                    status = %status,
                    "Tracked position is not ACTIVE, not triggering a withdrawal"
                );
                Ok(Step::Done(TickOutcome::NotActive))
            }
            Decision::Rebalance { distance } => {
                info!(
                    position = %position.id,
                    active_bin = snapshot.bin_id,
                    distance,
                    threshold = self.decision.threshold().bins(),
                    "Rebalance triggered"
                );
                self.begin_withdraw(
                    state,
                    WithdrawReason::RangeExit,
                    Some(snapshot.bin_id),
                    Some(distance),
                    true,
                )
                .await?;
                Ok(Step::Continue)
            }
            Decision::Empty => {
                warn!(position = %position.id, "Position has no bins, redeploying");
                self.begin_withdraw(
                    state,
                    WithdrawReason::EmptyPosition,
                    Some(snapshot.bin_id),
                    None,
                    true,
                )
                .await?;
                Ok(Step::Continue)
            }
        }
    }

    async fn begin_withdraw(
        &self,
        state: &mut StrategyState,
        reason: WithdrawReason,
        active_bin: Option<BinId>,
        distance: Option<u32>,
        redeploy: bool,
    ) -> Result<(), ControllerError> {
        let Some(mut position) = state.position.clone() else {
            return Err(ControllerError::Inconsistent(
                "withdraw without a position".to_string(),
            ));
        };

        position.begin_withdraw()?;
        self.store.update(&position).await?;
        self.tracker
            .record_withdraw_started(
                &position.id,
                &self.pool_address,
                WithdrawStartedData {
                    active_bin,
                    distance,
                    reason,
                },
            )
            .await;

        state.phase = ControllerPhase::Withdrawing;
        state.position = Some(position);
        state.withdraw = Some(WithdrawAttempt::new(reason, redeploy));
        Ok(())
    }

    async fn step_withdrawing(&self, state: &mut StrategyState) -> Result<Step, ControllerError> {
        let Some(position) = state.position.clone() else {
            return Err(ControllerError::Inconsistent(
                "WITHDRAWING without a position".to_string(),
            ));
        };
        let attempt = state
            .withdraw
            .get_or_insert_with(|| WithdrawAttempt::new(WithdrawReason::Resumed, true))
            .clone();

        if attempt.confirmed {
            return self.finish_withdraw(state).await;
        }

        let bins = position.bin_ids_vec();
        let held = match self.shares_remaining(&bins).await {
            Ok(held) => held,
            Err(err) => return self.read_failed(state, "user_bin_balances", err).await,
        };
        if !held {
            info!(
                position = %position.id,
                bins = ?bins,
                "No shares left in position bins, removal already happened"
            );
            let reason = if attempt.submitted {
                close_reason_for(attempt.reason)
            } else {
                CloseReason::AlreadyWithdrawn
            };
            mark_withdraw_confirmed(state, attempt.tx_hash.clone(), reason);
            return self.finish_withdraw(state).await;
        }

        if let Some(withdraw) = state.withdraw.as_mut() {
            withdraw.submitted = true;
        }
        let held_bins: &[BinId] = &bins;
        let result = self
            .submit(
                "remove_liquidity",
                || self.writer.remove_liquidity(held_bins),
                move || async move {
                    self.shares_remaining(held_bins)
                        .await
                        .map(|held| !held)
                },
            )
            .await;

        match result {
            Ok(tx_hash) => {
                mark_withdraw_confirmed(state, tx_hash, close_reason_for(attempt.reason));
                self.finish_withdraw(state).await
            }
            Err(err) => {
                self.fail(state, format!("remove_liquidity failed: {err}"))
                    .await
            }
        }
    }

    async fn finish_withdraw(&self, state: &mut StrategyState) -> Result<Step, ControllerError> {
        let (Some(mut position), Some(attempt)) =
            (state.position.clone(), state.withdraw.clone())
        else {
            return Err(ControllerError::Inconsistent(
                "confirmed removal without a position".to_string(),
            ));
        };

        position.close(attempt.tx_hash.clone())?;
        if let Err(err) = self.store.update(&position).await {
            error!(
                position = %position.id,
                error = %err,
                "Removal confirmed but not persisted, will retry"
            );
            return Err(err.into());
        }

        if attempt.tx_hash.is_some() {
            self.record_operation(
                OperationRecord::new(OperationKind::Remove, position.bin_ids_vec())
                    .for_position(&position.id)
                    .with_amounts(position.asset_x_amount, position.asset_y_amount)
                    .with_tx(attempt.tx_hash.clone()),
            )
            .await;
        }
        self.tracker
            .record_position_closed(
                &position.id,
                &self.pool_address,
                attempt.tx_hash.clone(),
                PositionClosedData {
                    bin_ids: position.bin_ids_vec(),
                    reason: attempt.close_reason.unwrap_or(CloseReason::Rebalance),
                },
            )
            .await;

        state.phase = ControllerPhase::Idle;
        state.position = None;
        state.withdraw = None;

        if attempt.redeploy {
            Ok(Step::Continue)
        } else {
            Ok(Step::Done(TickOutcome::Withdrawn {
                position_id: position.id,
            }))
        }
    }

    async fn fail(
        &self,
        state: &mut StrategyState,
        reason: String,
    ) -> Result<Step, ControllerError> {
        let phase = state.phase.to_string();
        error!(
            phase = %phase,
            reason = %reason,
            plan = ?state.deploy.as_ref().map(|d| &d.plan),
            snapshot = ?state.last_snapshot,
            position = ?state.position,
            "Controller entering FAILED"
        );

        state.phase = ControllerPhase::Failed;
        state.failure = Some(reason.clone());
        let Some(position) = state.position.as_mut() else {
            return Ok(Step::Done(TickOutcome::Failed { reason }));
        };

        position.mark_failed(reason.clone());
        self.tracker
            .record_failure(
                &position.id,
                &self.pool_address,
                FailureData {
                    phase,
                    reason: reason.clone(),
                },
            )
            .await;

        state.failure_unsaved = true;
        self.persist_failure(state).await?;
        Ok(Step::Done(TickOutcome::Failed { reason }))
    }

    /// Writes the failure marker of the halted position.
    async fn persist_failure(&self, state: &mut StrategyState) -> Result<(), ControllerError> {
        let Some(position) = state.position.as_ref() else {
            state.failure_unsaved = false;
            return Ok(());
        };
        if let Err(err) = self.store.update(position).await {
            error!(
                position = %position.id,
                error = %err,
                "Could not persist failure marker, will retry"
            );
            return Err(err.into());
        }
        state.failure_unsaved = false;
        Ok(())
    }

    /// Transport errors that outlived the retries skip the tick; anything
    /// else means the pool or contract cannot be read at all.
    async fn read_failed(
        &self,
        state: &mut StrategyState,
        what: &str,
        err: ChainError,
    ) -> Result<Step, ControllerError> {
        if !err.is_retryable() {
            return self.fail(state, format!("{what} failed: {err}")).await;
        }
        warn!(what, error = %err, "Chain read failed, skipping tick");
        Ok(Step::Done(TickOutcome::Skipped {
            reason: format!("{what}: {err}"),
        }))
    }

    async fn read<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        self.retry.retry_transient(what, |_| op()).await
    }

    /// Shares in the position's bins rose above the pre-submit baseline.
    async fn deposit_landed(&self, position: &Position) -> Result<bool, ChainError> {
        let bins = position.bin_ids_vec();
        let shares = self
            .read("user_bin_balances", || self.reader.user_bin_balances(&bins))
            .await?;
        Ok(position.gained_shares(&shares))
    }

    async fn shares_remaining(&self, bins: &[BinId]) -> Result<bool, ChainError> {
        if bins.is_empty() {
            return Ok(false);
        }
        let shares = self
            .read("user_bin_balances", || self.reader.user_bin_balances(bins))
            .await?;
        Ok(shares.values().any(|s| !s.is_zero()))
    }

    /// Submits a transaction with bounded retries. A confirmation timeout is
    /// resolved by asking `landed` before anything is resubmitted.
    async fn submit<S, SF, L, LF>(
        &self,
        action: &'static str,
        mut send: S,
        mut landed: L,
    ) -> Result<Option<String>, ChainError>
    where
        S: FnMut() -> SF,
        SF: Future<Output = Result<TxReceipt, ChainError>>,
        L: FnMut() -> LF,
        LF: Future<Output = Result<bool, ChainError>>,
    {
        let mut attempt = 0;
        loop {
            let err = match send().await {
                Ok(receipt) => return Ok(Some(receipt.tx_hash)),
                Err(err) => err,
            };
            attempt += 1;

            if err.is_timeout() {
                warn!(
                    action,
                    tx_hash = err.tx_hash().unwrap_or("-"),
                    "Confirmation timed out, re-checking chain"
                );
                if landed().await? {
                    info!(action, "Transaction landed despite the timeout");
                    return Ok(err.tx_hash().map(str::to_string));
                }
            } else if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.retry.max_attempts {
                return Err(err);
            }
            let delay = self.retry.next_delay(attempt - 1);
            warn!(
                action,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Submission failed, retrying"
            );
            sleep(delay).await;
        }
    }

    async fn record_operation(&self, operation: OperationRecord) {
        if let Err(err) = self.store.record_operation(&operation).await {
            warn!(kind = %operation.kind, error = %err, "Could not record operation history");
        }
    }
}

fn close_reason_for(reason: WithdrawReason) -> CloseReason {
    match reason {
        WithdrawReason::Manual => CloseReason::Manual,
        _ => CloseReason::Rebalance,
    }
}

fn mark_deploy_confirmed(state: &mut StrategyState, tx_hash: Option<String>) {
    if let Some(deploy) = state.deploy.as_mut() {
        deploy.confirmed = true;
        if tx_hash.is_some() {
            deploy.tx_hash = tx_hash;
        }
    }
}

fn mark_withdraw_confirmed(state: &mut StrategyState, tx_hash: Option<String>, reason: CloseReason) {
    if let Some(withdraw) = state.withdraw.as_mut() {
        withdraw.confirmed = true;
        withdraw.close_reason = Some(reason);
        if tx_hash.is_some() {
            withdraw.tx_hash = tx_hash;
        }
    }
}
