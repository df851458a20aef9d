pub mod amount;
pub mod balances;
pub mod bin_span;
pub mod strategy_params;

pub use amount::Amount;
pub use balances::TokenBalances;
pub use bin_span::BinSpan;
pub use strategy_params::{BinOffsets, RebalanceThreshold};
