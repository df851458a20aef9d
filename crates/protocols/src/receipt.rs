use serde::{Deserialize, Serialize};

/// Confirmed transaction outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash, `0x`-prefixed.
    pub tx_hash: String,
    /// Block the transaction was included in, when known.
    pub block_number: Option<u64>,
    pub success: bool,
}

impl TxReceipt {
    pub fn confirmed(tx_hash: impl Into<String>, block_number: Option<u64>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            block_number,
            success: true,
        }
    }
}
