//! Chain access for Liquidity Book pairs.
//!
//! The controller only sees the [`ChainReader`] and [`ChainWriter`] seams;
//! [`lb`] implements both against Trader Joe Liquidity Book v2.2 contracts.

/// Chain errors.
pub mod error;
/// Liquidity Book v2.2 binding.
pub mod lb;
/// Transaction receipts.
pub mod receipt;

use std::collections::BTreeMap;

use async_trait::async_trait;
use lb_lp_domain::entities::{ActiveBinSnapshot, BinId, MAX_BIN_ID, PositionPlan};
use lb_lp_domain::value_objects::TokenBalances;
use primitive_types::U256;
use rust_decimal::Decimal;

pub use error::ChainError;
pub use receipt::TxReceipt;

/// Read-only view of the pair and the operator's holdings.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current active bin id of the pair.
    async fn active_bin(&self) -> Result<BinId, ChainError>;

    /// Total pair reserves as `(x, y)`.
    async fn reserves(&self) -> Result<(Decimal, Decimal), ChainError>;

    /// LP shares held by the operator in each requested bin. Every requested
    /// id is present in the result, zero when nothing is held.
    async fn user_bin_balances(
        &self,
        bin_ids: &[BinId],
    ) -> Result<BTreeMap<BinId, U256>, ChainError>;

    /// Free token balances of the operator wallet.
    async fn wallet_balances(&self) -> Result<TokenBalances, ChainError>;

    async fn snapshot(&self) -> Result<ActiveBinSnapshot, ChainError> {
        let bin_id = self.active_bin().await?;
        let (reserve_x, reserve_y) = self.reserves().await?;
        Ok(ActiveBinSnapshot::new(bin_id, reserve_x, reserve_y))
    }

    /// Bins within `range` of `center` in which the operator holds shares.
    async fn scan_user_bins(
        &self,
        center: BinId,
        range: u32,
    ) -> Result<BTreeMap<BinId, U256>, ChainError> {
        let lo = center.saturating_sub(range);
        let hi = center.saturating_add(range).min(MAX_BIN_ID);
        let ids: Vec<BinId> = (lo..=hi).collect();
        let mut held = self.user_bin_balances(&ids).await?;
        held.retain(|_, shares| !shares.is_zero());
        Ok(held)
    }
}

/// Submits liquidity transactions and waits for their confirmation.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Deposits the plan's amounts into its bins.
    async fn add_liquidity(&self, plan: &PositionPlan) -> Result<TxReceipt, ChainError>;

    /// Withdraws every share the operator holds in `bin_ids`.
    async fn remove_liquidity(&self, bin_ids: &[BinId]) -> Result<TxReceipt, ChainError>;
}
