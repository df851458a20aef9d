use thiserror::Error;

use crate::enums::PositionStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: PositionStatus,
        to: PositionStatus,
    },
    #[error("unknown position status: {0}")]
    UnknownStatus(String),
    #[error("unknown operation kind: {0}")]
    UnknownOperation(String),
    #[error("{name} must be at least {min}, got {value}")]
    BelowMinimum {
        name: &'static str,
        min: u32,
        value: u32,
    },
    #[error("amount {0} cannot be represented on-chain")]
    AmountOverflow(String),
}
