use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Free (unlocked) amounts of both assets held by the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenBalances {
    pub x: Decimal,
    pub y: Decimal,
}

impl TokenBalances {
    pub fn new(x: Decimal, y: Decimal) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Both sides are zero or negative.
    pub fn is_empty(&self) -> bool {
        self.x <= Decimal::ZERO && self.y <= Decimal::ZERO
    }

    /// Subtracts `other` per asset, clamping at zero.
    pub fn saturating_sub(&self, other: &TokenBalances) -> TokenBalances {
        TokenBalances {
            x: (self.x - other.x).max(Decimal::ZERO),
            y: (self.y - other.y).max(Decimal::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_saturating_sub_clamps() {
        let wallet = TokenBalances::new(dec!(1.5), dec!(0.00001));
        let reserve = TokenBalances::new(dec!(0.5), dec!(0.001));
        let spendable = wallet.saturating_sub(&reserve);
        assert_eq!(spendable.x, dec!(1.0));
        assert_eq!(spendable.y, Decimal::ZERO);
        assert!(!spendable.is_empty());
        assert!(TokenBalances::zero().is_empty());
    }
}
