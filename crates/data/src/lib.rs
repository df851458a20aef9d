//! Persistence for strategy positions and the operations history.
//!
//! [`PositionStore`] is the seam the controller writes through. The SQLite
//! repository is used in production; [`InMemoryPositionStore`] mirrors its
//! semantics for tests and dry runs.

/// Store errors.
pub mod error;
/// In-memory store.
pub mod memory;
/// SQLite repositories.
pub mod repositories;

use async_trait::async_trait;
use lb_lp_domain::entities::{OperationRecord, Position};

pub use error::StoreError;
pub use memory::InMemoryPositionStore;
pub use repositories::{Database, SqlitePositionRepository};

/// Durable record of positions and operations.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Inserts a new position.
    ///
    /// Fails with [`StoreError::OpenPositionExists`] when `position` is open
    /// and the pool already has a non-CLOSED position.
    async fn insert(&self, position: &Position) -> Result<(), StoreError>;

    /// Overwrites the stored copy of `position`.
    async fn update(&self, position: &Position) -> Result<(), StoreError>;

    /// The pool's single non-CLOSED position, if any.
    async fn current(&self, pool_address: &str) -> Result<Option<Position>, StoreError>;

    /// The pool's positions, newest first.
    async fn history(&self, pool_address: &str, limit: u32) -> Result<Vec<Position>, StoreError>;

    async fn record_operation(&self, operation: &OperationRecord) -> Result<(), StoreError>;

    /// Recorded operations, newest first.
    async fn operations(&self, limit: u32) -> Result<Vec<OperationRecord>, StoreError>;
}
