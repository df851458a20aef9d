//! Startup reconciliation of the stored position against the chain.

use std::collections::BTreeMap;
use std::sync::Arc;

use lb_lp_data::PositionStore;
use lb_lp_domain::entities::{BinId, Position};
use lb_lp_domain::enums::PositionStatus;
use lb_lp_protocols::{ChainError, ChainReader};
use primitive_types::U256;
use tracing::{debug, info, warn};

use crate::config::StrategyConfig;
use crate::lifecycle::{ControllerError, StrategyState};
use crate::retry::RetryPolicy;

/// How the stored position was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// No open position; start from IDLE.
    NoPosition,
    /// ACTIVE position confirmed on-chain.
    Resumed,
    /// PENDING deposit found on-chain and promoted to ACTIVE.
    Activated,
    /// PENDING deposit never landed; closed.
    ClosedNeverLanded,
    /// ACTIVE position has no shares left; closed.
    ClosedExternal,
    /// Interrupted removal; it will be re-attempted.
    ResumeWithdraw,
    /// A failure marker is set; operator action required.
    Failed,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileResult {
    pub status: ReconcileStatus,
    /// State the controller should continue from.
    pub state: StrategyState,
    /// Stored position after reconciliation, if it was open.
    pub position: Option<Position>,
    /// Bins near the active bin holding operator shares the store does not
    /// know about.
    pub orphan_bins: BTreeMap<BinId, U256>,
}

impl ReconcileResult {
    fn new(status: ReconcileStatus, state: StrategyState, position: Option<Position>) -> Self {
        Self {
            status,
            state,
            position,
            orphan_bins: BTreeMap::new(),
        }
    }
}

/// Rebuilds controller state from the store and on-chain shares.
pub struct Reconciler {
    reader: Arc<dyn ChainReader>,
    store: Arc<dyn PositionStore>,
    retry: RetryPolicy,
    pool_address: String,
    scan_range: u32,
}

impl Reconciler {
    pub fn new(
        config: &StrategyConfig,
        reader: Arc<dyn ChainReader>,
        store: Arc<dyn PositionStore>,
    ) -> Self {
        Self {
            reader,
            store,
            retry: config.retry.clone(),
            pool_address: config.pool_address.clone(),
            scan_range: config.scan_range,
        }
    }

    /// Resolves the pool's open position, persisting any status it implies.
    ///
    /// # Errors
    /// Fails when the store is unavailable or the chain cannot be read.
    pub async fn reconcile(&self) -> Result<ReconcileResult, ControllerError> {
        let current = self.store.current(&self.pool_address).await?;

        let mut result = match current {
            None => ReconcileResult::new(ReconcileStatus::NoPosition, StrategyState::idle(), None),
            Some(position) => self.reconcile_position(position).await?,
        };

        result.orphan_bins = self.scan_orphans(result.position.as_ref()).await;
        if !result.orphan_bins.is_empty() {
            warn!(
                pool = %self.pool_address,
                bins = ?result.orphan_bins.keys().collect::<Vec<_>>(),
                "Shares found in bins not tracked by any open position"
            );
        }

        info!(
            pool = %self.pool_address,
            status = ?result.status,
            phase = %result.state.phase,
            "Reconciliation complete"
        );
        Ok(result)
    }

    async fn reconcile_position(
        &self,
        mut position: Position,
    ) -> Result<ReconcileResult, ControllerError> {
        if let Some(reason) = position.failure.clone() {
            warn!(
                position = %position.id,
                status = %position.status,
                reason = %reason,
                "Stored position carries a failure marker"
            );
            return Ok(ReconcileResult::new(
                ReconcileStatus::Failed,
                StrategyState::failed(Some(position.clone()), reason),
                Some(position),
            ));
        }

        match position.status {
            PositionStatus::Pending => {
                let shares = self.bin_shares(&position).await?;
                if position.gained_shares(&shares) {
                    info!(position = %position.id, "Pending deposit landed, activating");
                    position.activate(None)?;
                    self.store.update(&position).await?;
                    Ok(ReconcileResult::new(
                        ReconcileStatus::Activated,
                        StrategyState::active(position.clone()),
                        Some(position),
                    ))
                } else {
                    info!(position = %position.id, "Pending deposit never landed, closing");
                    position.close(None)?;
                    self.store.update(&position).await?;
                    Ok(ReconcileResult::new(
                        ReconcileStatus::ClosedNeverLanded,
                        StrategyState::idle(),
                        None,
                    ))
                }
            }
            PositionStatus::Active => {
                let shares = self.bin_shares(&position).await?;
                if shares.values().any(|s| !s.is_zero()) {
                    debug!(position = %position.id, "Active position confirmed on-chain");
                    Ok(ReconcileResult::new(
                        ReconcileStatus::Resumed,
                        StrategyState::active(position.clone()),
                        Some(position),
                    ))
                } else {
                    warn!(
                        position = %position.id,
                        "Active position holds no shares, closing as withdrawn externally"
                    );
                    position.close(None)?;
                    self.store.update(&position).await?;
                    Ok(ReconcileResult::new(
                        ReconcileStatus::ClosedExternal,
                        StrategyState::idle(),
                        None,
                    ))
                }
            }
            PositionStatus::Withdrawing => {
                info!(position = %position.id, "Resuming interrupted withdrawal");
                Ok(ReconcileResult::new(
                    ReconcileStatus::ResumeWithdraw,
                    StrategyState::withdrawing(position.clone()),
                    Some(position),
                ))
            }
            PositionStatus::Closed => Err(ControllerError::Inconsistent(format!(
                "store returned CLOSED position {} as current",
                position.id
            ))),
        }
    }

    /// Clears the failure marker on the pool's open position so the next
    /// reconciliation resolves it normally.
    ///
    /// # Errors
    /// Fails when the store is unavailable.
    pub async fn clear_failure(&self) -> Result<Option<Position>, ControllerError> {
        let Some(mut position) = self.store.current(&self.pool_address).await? else {
            return Ok(None);
        };
        if !position.is_failed() {
            return Ok(Some(position));
        }
        position.clear_failure();
        self.store.update(&position).await?;
        info!(position = %position.id, "Failure marker cleared");
        Ok(Some(position))
    }

    async fn bin_shares(&self, position: &Position) -> Result<BTreeMap<BinId, U256>, ChainError> {
        let bins = position.bin_ids_vec();
        if bins.is_empty() {
            return Ok(BTreeMap::new());
        }
        self.retry
            .retry_transient("user_bin_balances", |_| self.reader.user_bin_balances(&bins))
            .await
    }

    async fn scan_orphans(&self, tracked: Option<&Position>) -> BTreeMap<BinId, U256> {
        if self.scan_range == 0 {
            return BTreeMap::new();
        }
        let scan = async {
            let center = self.reader.active_bin().await?;
            self.reader.scan_user_bins(center, self.scan_range).await
        };
        match scan.await {
            Ok(mut held) => {
                if let Some(position) = tracked {
                    held.retain(|bin, _| !position.bin_ids.contains(bin));
                }
                held
            }
            Err(err) => {
                warn!(error = %err, "Orphan share scan failed");
                BTreeMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChain;
    use lb_lp_data::InMemoryPositionStore;
    use lb_lp_domain::entities::{PlannedBin, PositionPlan};
    use lb_lp_domain::enums::Asset;
    use lb_lp_domain::value_objects::TokenBalances;
    use rust_decimal_macros::dec;

    const POOL: &str = "0xpool";

    fn plan() -> PositionPlan {
        PositionPlan::new(
            100,
            vec![
                PlannedBin {
                    bin_id: 101,
                    asset: Asset::X,
                    amount: dec!(1),
                },
                PlannedBin {
                    bin_id: 99,
                    asset: Asset::Y,
                    amount: dec!(1),
                },
            ],
        )
    }

    fn setup() -> (Arc<FakeChain>, Arc<InMemoryPositionStore>, Reconciler) {
        let chain = Arc::new(FakeChain::new(100, TokenBalances::zero()));
        let store = Arc::new(InMemoryPositionStore::new());
        let config = StrategyConfig::new(POOL, "0xowner");
        let reconciler = Reconciler::new(&config, chain.clone(), store.clone());
        (chain, store, reconciler)
    }

    #[tokio::test]
    async fn test_no_position_starts_idle() {
        let (_, _, reconciler) = setup();
        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::NoPosition);
        assert!(result.position.is_none());
        assert!(result.orphan_bins.is_empty());
    }

    #[tokio::test]
    async fn test_pending_with_shares_is_activated() {
        let (chain, store, reconciler) = setup();
        let position = Position::pending(POOL, "0xowner", &plan());
        store.insert(&position).await.unwrap();
        chain.set_shares(101, 5);

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::Activated);
        let stored = store.current(POOL).await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::Active);
    }

    #[tokio::test]
    async fn test_pending_without_shares_is_closed() {
        let (_, store, reconciler) = setup();
        let position = Position::pending(POOL, "0xowner", &plan());
        store.insert(&position).await.unwrap();

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::ClosedNeverLanded);
        assert!(store.current(POOL).await.unwrap().is_none());
        assert_eq!(store.all().await[0].status, PositionStatus::Closed);
    }

    #[tokio::test]
    async fn test_pending_with_only_preexisting_shares_is_closed() {
        let (chain, store, reconciler) = setup();
        chain.set_shares(101, 5);
        chain.set_shares(99, 3);
        let baseline = BTreeMap::from([(101, U256::from(5)), (99, U256::from(3))]);
        let position = Position::pending(POOL, "0xowner", &plan()).with_share_baseline(baseline);
        store.insert(&position).await.unwrap();

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::ClosedNeverLanded);
        assert!(store.current(POOL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_above_baseline_is_activated() {
        let (chain, store, reconciler) = setup();
        chain.set_shares(101, 1_005);
        let baseline = BTreeMap::from([(101, U256::from(5))]);
        let position = Position::pending(POOL, "0xowner", &plan()).with_share_baseline(baseline);
        store.insert(&position).await.unwrap();

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::Activated);
    }

    #[tokio::test]
    async fn test_active_without_shares_is_closed_external() {
        let (_, store, reconciler) = setup();
        let mut position = Position::pending(POOL, "0xowner", &plan());
        position.activate(None).unwrap();
        store.insert(&position).await.unwrap();

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::ClosedExternal);
        assert!(store.current(POOL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_withdrawing_resumes_removal() {
        let (chain, store, reconciler) = setup();
        let mut position = Position::pending(POOL, "0xowner", &plan());
        position.activate(None).unwrap();
        position.begin_withdraw().unwrap();
        store.insert(&position).await.unwrap();
        chain.set_shares(99, 5);

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::ResumeWithdraw);
        assert_eq!(
            result.state.phase,
            crate::lifecycle::ControllerPhase::Withdrawing
        );
    }

    #[tokio::test]
    async fn test_failure_marker_halts_until_cleared() {
        let (chain, store, reconciler) = setup();
        let mut position = Position::pending(POOL, "0xowner", &plan());
        position.mark_failed("add_liquidity reverted");
        store.insert(&position).await.unwrap();
        chain.set_shares(101, 5);

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::Failed);
        assert!(result.state.is_failed());

        let cleared = reconciler.clear_failure().await.unwrap().unwrap();
        assert!(!cleared.is_failed());
        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::Activated);
    }

    #[tokio::test]
    async fn test_reports_untracked_shares() {
        let (chain, store, reconciler) = setup();
        let mut position = Position::pending(POOL, "0xowner", &plan());
        position.activate(None).unwrap();
        store.insert(&position).await.unwrap();
        chain.set_shares(101, 5);
        chain.set_shares(105, 7);

        let result = reconciler.reconcile().await.unwrap();
        assert_eq!(result.status, ReconcileStatus::Resumed);
        assert_eq!(result.orphan_bins.len(), 1);
        assert_eq!(result.orphan_bins.get(&105), Some(&U256::from(7)));
    }
}
