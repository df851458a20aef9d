use lb_lp_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("contract error: {0}")]
    Contract(String),

    #[error(
        "transaction reverted ({}): {reason}",
        .tx_hash.as_deref().unwrap_or("not mined")
    )]
    Reverted {
        tx_hash: Option<String>,
        reason: String,
    },

    #[error("transaction {tx_hash} not confirmed before timeout")]
    TxTimeout { tx_hash: String },

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("amount conversion failed: {0}")]
    Conversion(#[from] DomainError),
}

impl ChainError {
    /// Transient transport failures that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Rpc(_))
    }

    /// The transaction was broadcast but its outcome is unknown.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChainError::TxTimeout { .. })
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            ChainError::Reverted { tx_hash, .. } => tx_hash.as_deref(),
            ChainError::TxTimeout { tx_hash } => Some(tx_hash),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rpc_is_retryable() {
        assert!(ChainError::Rpc("connection reset".into()).is_retryable());
        assert!(!ChainError::Contract("bad abi".into()).is_retryable());
        assert!(
            !ChainError::Reverted {
                tx_hash: None,
                reason: "LBRouter__IdSlippageCaught".into()
            }
            .is_retryable()
        );
        assert!(
            !ChainError::TxTimeout {
                tx_hash: "0x1".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_reverted_display_without_hash() {
        let err = ChainError::Reverted {
            tx_hash: None,
            reason: "execution reverted".into(),
        };
        assert_eq!(
            err.to_string(),
            "transaction reverted (not mined): execution reverted"
        );
    }
}
