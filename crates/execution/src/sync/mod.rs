//! State synchronization with on-chain data.
//!
//! Run once at startup, before the first tick:
//! - Resolves PENDING and WITHDRAWING positions left by a crash
//! - Closes positions whose shares are gone
//! - Reports operator shares outside the tracked position

mod reconciler;

pub use reconciler::*;
