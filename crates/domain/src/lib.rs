//! Core domain types for Liquidity Book liquidity provision.
//!
//! Bins, snapshots, deployment plans and persisted positions. Everything in
//! this crate is plain data plus the invariants that guard it; no I/O.

/// Domain entities.
pub mod entities;
/// Domain enums.
pub mod enums;
/// Domain errors.
pub mod error;
/// Value objects.
pub mod value_objects;

pub use error::DomainError;
