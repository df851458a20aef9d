//! Rebalancing engine for a single Liquidity Book position.
//!
//! This crate provides the strategy side of the liquidity provider:
//! - Bin placement planning around the active bin
//! - Drift decisions against a rebalance threshold
//! - The position lifecycle controller and its event history
//! - Startup reconciliation with on-chain shares
//! - Bounded retries for chain access
//! - The periodic strategy executor

/// Prelude module for convenient imports.
pub mod prelude;

/// Strategy configuration.
pub mod config;
/// Position lifecycle.
pub mod lifecycle;
/// Retry policy.
pub mod retry;
/// Strategy execution.
pub mod strategy;
/// State synchronization.
pub mod sync;

#[cfg(test)]
mod testing;
