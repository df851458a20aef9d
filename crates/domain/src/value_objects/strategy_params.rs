use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// How far from the active bin each asset is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinOffsets {
    /// Bins above the active bin for asset X.
    pub x_offset: u32,
    /// Bins below the active bin for asset Y.
    pub y_offset: u32,
}

impl BinOffsets {
    pub fn new(x_offset: u32, y_offset: u32) -> Result<Self, DomainError> {
        if x_offset < 1 {
            return Err(DomainError::BelowMinimum {
                name: "asset_x_offset",
                min: 1,
                value: x_offset,
            });
        }
        if y_offset < 1 {
            return Err(DomainError::BelowMinimum {
                name: "asset_y_offset",
                min: 1,
                value: y_offset,
            });
        }
        Ok(Self { x_offset, y_offset })
    }
}

impl Default for BinOffsets {
    fn default() -> Self {
        Self {
            x_offset: 1,
            y_offset: 1,
        }
    }
}

/// Minimum bin drift outside the position's span that triggers a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RebalanceThreshold(u32);

impl RebalanceThreshold {
    pub fn new(bins: u32) -> Result<Self, DomainError> {
        if bins < 1 {
            return Err(DomainError::BelowMinimum {
                name: "rebalance_threshold",
                min: 1,
                value: bins,
            });
        }
        Ok(Self(bins))
    }

    pub fn bins(&self) -> u32 {
        self.0
    }
}

impl Default for RebalanceThreshold {
    fn default() -> Self {
        Self(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_reject_zero() {
        assert!(BinOffsets::new(0, 1).is_err());
        assert!(BinOffsets::new(1, 0).is_err());
        assert_eq!(BinOffsets::new(2, 3).unwrap().y_offset, 3);
    }

    #[test]
    fn test_threshold_rejects_zero() {
        assert!(RebalanceThreshold::new(0).is_err());
        assert_eq!(RebalanceThreshold::new(4).unwrap().bins(), 4);
    }
}
