//! Position lifecycle.
//!
//! Drives a single strategy position through its states:
//! - Deploying a fresh plan around the active bin
//! - Watching the active bin for drift
//! - Withdrawing and redeploying
//! - Halting for the operator when an outcome is unsafe to guess

mod controller;
mod events;
mod state;
mod tracker;

pub use controller::*;
pub use events::*;
pub use state::*;
pub use tracker::*;
