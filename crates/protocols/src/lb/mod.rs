//! Trader Joe Liquidity Book v2.2 adapter.
//!
//! This module provides functionality to interact with a single LB pair:
//! - Read pair state and the operator's per-bin shares
//! - Deposit and withdraw through the LB router
//! - Manage token and LP approvals

/// Pair client implementing the reader and writer seams.
pub mod client;
/// Connection and transaction settings.
pub mod config;
/// Contract bindings.
pub mod contracts;
/// Writer that only logs.
pub mod dry_run;
/// Router call parameter construction.
pub mod params;
/// Signer loading.
pub mod wallet;

pub use client::{BinReserves, LbPairClient, PoolInfo};
pub use config::LbClientConfig;
pub use dry_run::{DryRunWriter, IntendedTx};
