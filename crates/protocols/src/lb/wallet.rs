use alloy::signers::local::PrivateKeySigner;
use zeroize::Zeroizing;

use crate::error::ChainError;

/// Parses a hex private key. The key text is wiped when `key` drops.
pub fn signer_from_key(key: Zeroizing<String>) -> Result<PrivateKeySigner, ChainError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(ChainError::Wallet("private key is empty".to_string()));
    }
    trimmed
        .parse::<PrivateKeySigner>()
        .map_err(|_| ChainError::Wallet("private key is not valid hex".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_prefixed_key() {
        let key = Zeroizing::new(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string(),
        );
        assert!(signer_from_key(key).is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            signer_from_key(Zeroizing::new("   ".to_string())),
            Err(ChainError::Wallet(_))
        ));
        assert!(signer_from_key(Zeroizing::new("0xnothex".to_string())).is_err());
    }
}
