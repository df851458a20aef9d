use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lb_lp_domain::entities::{OperationRecord, Position};
use tokio::sync::RwLock;

use crate::PositionStore;
use crate::error::StoreError;

/// Process-local [`PositionStore`] with the same invariants as the SQLite one.
#[derive(Debug, Default)]
pub struct InMemoryPositionStore {
    positions: RwLock<Vec<Position>>,
    operations: RwLock<Vec<OperationRecord>>,
    fail_writes: AtomicBool,
    fail_updates: AtomicBool,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent updates fail while inserts and operation records
    /// still succeed.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Every stored position in insertion order.
    pub async fn all(&self) -> Vec<Position> {
        self.positions.read().await.clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn insert(&self, position: &Position) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut positions = self.positions.write().await;
        if positions.iter().any(|p| p.id == position.id) {
            return Err(StoreError::Corrupt(format!("duplicate id {}", position.id)));
        }
        let conflict = position.status.is_open()
            && positions
                .iter()
                .any(|p| p.pool_address == position.pool_address && p.status.is_open());
        if conflict {
            return Err(StoreError::OpenPositionExists(position.pool_address.clone()));
        }
        positions.push(position.clone());
        Ok(())
    }

    async fn update(&self, position: &Position) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("updates disabled".to_string()));
        }
        let mut positions = self.positions.write().await;
        let conflict = position.status.is_open()
            && positions.iter().any(|p| {
                p.id != position.id
                    && p.pool_address == position.pool_address
                    && p.status.is_open()
            });
        if conflict {
            return Err(StoreError::OpenPositionExists(position.pool_address.clone()));
        }
        let slot = positions
            .iter_mut()
            .find(|p| p.id == position.id)
            .ok_or_else(|| StoreError::NotFound(position.id.to_string()))?;
        *slot = position.clone();
        Ok(())
    }

    async fn current(&self, pool_address: &str) -> Result<Option<Position>, StoreError> {
        Ok(self
            .positions
            .read()
            .await
            .iter()
            .find(|p| p.pool_address == pool_address && p.status.is_open())
            .cloned())
    }

    async fn history(&self, pool_address: &str, limit: u32) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .positions
            .read()
            .await
            .iter()
            .rev()
            .filter(|p| p.pool_address == pool_address)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn record_operation(&self, operation: &OperationRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.operations.write().await.push(operation.clone());
        Ok(())
    }

    async fn operations(&self, limit: u32) -> Result<Vec<OperationRecord>, StoreError> {
        Ok(self
            .operations
            .read()
            .await
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_lp_domain::entities::{PlannedBin, PositionPlan};
    use lb_lp_domain::enums::{Asset, PositionStatus};
    use rust_decimal_macros::dec;

    fn plan() -> PositionPlan {
        PositionPlan::new(
            100,
            vec![PlannedBin {
                bin_id: 101,
                asset: Asset::X,
                amount: dec!(1),
            }],
        )
    }

    #[tokio::test]
    async fn test_single_open_position_per_pool() {
        let store = InMemoryPositionStore::new();
        store
            .insert(&Position::pending("pool", "owner", &plan()))
            .await
            .unwrap();

        let err = store
            .insert(&Position::pending("pool", "owner", &plan()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OpenPositionExists(_)));

        store
            .insert(&Position::pending("other-pool", "owner", &plan()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_and_history() {
        let store = InMemoryPositionStore::new();
        let mut position = Position::pending("pool", "owner", &plan());
        store.insert(&position).await.unwrap();
        position.close(None).unwrap();
        store.update(&position).await.unwrap();

        assert!(store.current("pool").await.unwrap().is_none());
        let history = store.history("pool", 5).await.unwrap();
        assert_eq!(history[0].status, PositionStatus::Closed);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = InMemoryPositionStore::new();
        store.set_fail_writes(true);
        let err = store
            .insert(&Position::pending("pool", "owner", &plan()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_updates_keeps_inserts() {
        let store = InMemoryPositionStore::new();
        store.set_fail_updates(true);
        let mut position = Position::pending("pool", "owner", &plan());
        store.insert(&position).await.unwrap();

        position.activate(None).unwrap();
        let err = store.update(&position).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.all().await[0].status, PositionStatus::Pending);

        store.set_fail_updates(false);
        store.update(&position).await.unwrap();
        assert_eq!(store.all().await[0].status, PositionStatus::Active);
    }
}
