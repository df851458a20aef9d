//! Automated strategy execution.
//!
//! This module provides:
//! - Bin placement for new deposits
//! - Drift evaluation against the active bin
//! - The periodic executor loop

mod decision;
mod executor;
mod planner;

pub use decision::*;
pub use executor::*;
pub use planner::*;
