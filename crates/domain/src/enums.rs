use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// One side of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    X,
    Y,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::X => write!(f, "X"),
            Asset::Y => write!(f, "Y"),
        }
    }
}

/// Persisted status of a strategy position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Deploy transaction about to be, or already, submitted.
    Pending,
    /// Deposit confirmed on-chain.
    Active,
    /// Removal in progress.
    Withdrawing,
    /// Funds confirmed withdrawn, or the deploy never landed.
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Pending => "PENDING",
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Withdrawing => "WITHDRAWING",
            PositionStatus::Closed => "CLOSED",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, PositionStatus::Closed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Closed)
                | (Active, Withdrawing)
                | (Active, Closed)
                | (Withdrawing, Closed)
        )
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PositionStatus::Pending),
            "ACTIVE" => Ok(PositionStatus::Active),
            "WITHDRAWING" => Ok(PositionStatus::Withdrawing),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Kind of liquidity operation recorded in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Add,
    Remove,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "ADD",
            OperationKind::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(OperationKind::Add),
            "REMOVE" => Ok(OperationKind::Remove),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}
