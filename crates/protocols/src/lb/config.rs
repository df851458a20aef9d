use std::time::Duration;

use alloy::primitives::{Address, address};

/// Avalanche C-Chain public RPC.
pub const DEFAULT_RPC_URL: &str = "https://api.avax.network/ext/bc/C/rpc";
pub const AVALANCHE_CHAIN_ID: u64 = 43114;

/// WAVAX/BTC.b LB v2.2 pair.
pub const DEFAULT_PAIR_ADDRESS: Address = address!("856b38bf1e2e367f747dd4d3951dda8a35f1bf60");
/// LB router v2.2.
pub const DEFAULT_ROUTER_ADDRESS: Address = address!("18556da13313f3532c54711497a8fedac273220e");

/// Settings for [`super::LbPairClient`].
#[derive(Debug, Clone)]
pub struct LbClientConfig {
    /// HTTP RPC endpoint.
    pub rpc_url: String,
    /// Expected chain id; connecting to any other chain is refused.
    pub chain_id: u64,
    /// LB pair contract.
    pub pair_address: Address,
    /// LB router contract.
    pub router_address: Address,
    /// Tolerated shortfall on deposited and withdrawn amounts, in basis points.
    pub slippage_bps: u32,
    /// Tolerated active bin movement between planning and execution.
    pub id_slippage: u32,
    /// Offset from submission time used as the router deadline.
    pub deadline: Duration,
    /// How long to wait for a receipt before reporting a timeout.
    pub confirmation_timeout: Duration,
}

impl Default for LbClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: AVALANCHE_CHAIN_ID,
            pair_address: DEFAULT_PAIR_ADDRESS,
            router_address: DEFAULT_ROUTER_ADDRESS,
            slippage_bps: 500,
            id_slippage: 0,
            deadline: Duration::from_secs(300),
            confirmation_timeout: Duration::from_secs(120),
        }
    }
}
