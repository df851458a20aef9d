//! Strategy configuration and validation.

use std::time::Duration;

use lb_lp_domain::DomainError;
use lb_lp_domain::value_objects::{BinOffsets, RebalanceThreshold, TokenBalances};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Default polling period between ticks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(120);
/// Default half-width of the orphan share scan around the active bin.
pub const DEFAULT_SCAN_RANGE: u32 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("{0} must not be empty")]
    Missing(&'static str),
    #[error("bins_per_side must be at least 1")]
    ZeroBinsPerSide,
    #[error("check interval must be positive")]
    ZeroInterval,
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: Decimal },
}

/// Everything the controller needs to run one strategy instance.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Pair the strategy provides liquidity to.
    pub pool_address: String,
    /// Operator wallet address recorded on positions.
    pub owner_address: String,
    /// Distance of each asset from the active bin.
    pub offsets: BinOffsets,
    /// Consecutive bins each asset is spread over.
    pub bins_per_side: u32,
    /// Drift outside the position span that triggers a rebalance.
    pub rebalance_threshold: RebalanceThreshold,
    /// Period between ticks.
    pub check_interval: Duration,
    /// Per-asset amount always left in the wallet.
    pub reserve: TokenBalances,
    /// Per-asset amount below which the asset is not deployed.
    pub min_deposit: TokenBalances,
    /// Backoff for chain reads and writes.
    pub retry: RetryPolicy,
    /// Half-width of the orphan share scan done at startup; zero disables it.
    pub scan_range: u32,
}

impl StrategyConfig {
    pub fn new(pool_address: impl Into<String>, owner_address: impl Into<String>) -> Self {
        Self {
            pool_address: pool_address.into(),
            owner_address: owner_address.into(),
            offsets: BinOffsets::default(),
            bins_per_side: 1,
            rebalance_threshold: RebalanceThreshold::default(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            reserve: TokenBalances::zero(),
            min_deposit: TokenBalances::zero(),
            retry: RetryPolicy::default(),
            scan_range: DEFAULT_SCAN_RANGE,
        }
    }

    /// Checks the invariants the value objects cannot express alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_address.trim().is_empty() {
            return Err(ConfigError::Missing("pool_address"));
        }
        if self.owner_address.trim().is_empty() {
            return Err(ConfigError::Missing("owner_address"));
        }
        // Re-run the constructors in case fields were assigned directly.
        BinOffsets::new(self.offsets.x_offset, self.offsets.y_offset)?;
        RebalanceThreshold::new(self.rebalance_threshold.bins())?;
        if self.bins_per_side == 0 {
            return Err(ConfigError::ZeroBinsPerSide);
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        for (name, value) in [
            ("reserve_x", self.reserve.x),
            ("reserve_y", self.reserve.y),
            ("min_deposit_x", self.min_deposit.x),
            ("min_deposit_y", self.min_deposit.y),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ConfigError::Negative { name, value });
            }
        }
        Ok(())
    }
}
