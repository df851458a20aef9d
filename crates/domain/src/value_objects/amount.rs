use primitive_types::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Raw on-chain token quantity together with the token's decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount {
    pub raw: U256,
    pub decimals: u8,
}

impl Amount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(U256::zero(), decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Scales a human-readable amount to raw units, truncating sub-unit dust.
    pub fn from_decimal(d: Decimal, decimals: u8) -> Result<Self, DomainError> {
        if d.is_sign_negative() {
            return Err(DomainError::AmountOverflow(d.to_string()));
        }
        let overflow = || DomainError::AmountOverflow(d.to_string());
        let multiplier = 10u128
            .checked_pow(u32::from(decimals))
            .and_then(Decimal::from_u128)
            .ok_or_else(overflow)?;
        let raw = d
            .checked_mul(multiplier)
            .ok_or_else(overflow)?
            .trunc()
            .to_u128()
            .ok_or_else(overflow)?;
        Ok(Self::new(U256::from(raw), decimals))
    }

    /// Converts raw units back to a decimal amount without rounding.
    pub fn to_decimal(&self) -> Result<Decimal, DomainError> {
        let overflow = || DomainError::AmountOverflow(self.raw.to_string());
        if self.raw > U256::from(i128::MAX as u128) {
            return Err(overflow());
        }
        let mantissa = self.raw.as_u128() as i128;
        Decimal::try_from_i128_with_scale(mantissa, u32::from(self.decimals))
            .map(|d| d.normalize())
            .map_err(|_| overflow())
    }
}
