use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lb_lp_domain::entities::{BinId, PositionPlan};
use lb_lp_domain::enums::Asset;
use tracing::info;

use crate::error::ChainError;
use crate::receipt::TxReceipt;
use crate::ChainWriter;

/// Transaction the dry-run writer would have submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntendedTx {
    Add(PositionPlan),
    Remove(Vec<BinId>),
}

/// Writer that logs intended transactions and confirms them synthetically.
#[derive(Debug, Default)]
pub struct DryRunWriter {
    counter: AtomicU64,
    journal: Mutex<Vec<IntendedTx>>,
}

impl DryRunWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything submitted so far, oldest first.
    pub fn journal(&self) -> Vec<IntendedTx> {
        self.journal
            .lock()
            .map(|j| j.clone())
            .unwrap_or_default()
    }

    fn record(&self, tx: IntendedTx) -> TxReceipt {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(tx);
        }
        TxReceipt::confirmed(format!("dry-run-{n}"), None)
    }
}

#[async_trait]
impl ChainWriter for DryRunWriter {
    async fn add_liquidity(&self, plan: &PositionPlan) -> Result<TxReceipt, ChainError> {
        info!(
            active_bin = plan.active_bin,
            bins = ?plan.bin_ids(),
            amount_x = %plan.total(Asset::X),
            amount_y = %plan.total(Asset::Y),
            "[dry-run] Would add liquidity"
        );
        Ok(self.record(IntendedTx::Add(plan.clone())))
    }

    async fn remove_liquidity(&self, bin_ids: &[BinId]) -> Result<TxReceipt, ChainError> {
        info!(bins = ?bin_ids, "[dry-run] Would remove liquidity");
        Ok(self.record(IntendedTx::Remove(bin_ids.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_lp_domain::entities::PlannedBin;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_dry_run_journals_calls() {
        let writer = DryRunWriter::new();
        let plan = PositionPlan::new(
            100,
            vec![PlannedBin {
                bin_id: 101,
                asset: Asset::X,
                amount: dec!(1),
            }],
        );

        let add = writer.add_liquidity(&plan).await.unwrap();
        let remove = writer.remove_liquidity(&[101]).await.unwrap();

        assert_eq!(add.tx_hash, "dry-run-1");
        assert_eq!(remove.tx_hash, "dry-run-2");
        assert!(remove.success);
        assert_eq!(
            writer.journal(),
            vec![IntendedTx::Add(plan), IntendedTx::Remove(vec![101])]
        );
    }
}
