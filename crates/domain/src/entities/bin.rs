use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Liquidity Book bin identifier (a `uint24` on-chain).
pub type BinId = u32;

/// Largest bin id representable by the pair contract.
pub const MAX_BIN_ID: BinId = (1 << 24) - 1;

/// Pool state observed in a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBinSnapshot {
    pub bin_id: BinId,
    pub reserve_x: Decimal,
    pub reserve_y: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl ActiveBinSnapshot {
    pub fn new(bin_id: BinId, reserve_x: Decimal, reserve_y: Decimal) -> Self {
        Self {
            bin_id,
            reserve_x,
            reserve_y,
            observed_at: Utc::now(),
        }
    }
}
