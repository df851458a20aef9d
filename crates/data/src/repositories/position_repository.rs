//! Position repository for strategy position persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lb_lp_domain::entities::{BinId, OperationRecord, Position, PositionId};
use lb_lp_domain::enums::{OperationKind, PositionStatus};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::PositionStore;
use crate::error::StoreError;

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("uuid {value}: {e}")))
}

fn parse_decimal(value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|e| StoreError::Corrupt(format!("decimal {value}: {e}")))
}

fn position_from_row(row: &SqliteRow) -> Result<Position, StoreError> {
    let id: String = row.try_get("id")?;
    let bin_ids: String = row.try_get("bin_ids")?;
    let bin_ids: Vec<BinId> = serde_json::from_str(&bin_ids)?;
    let asset_x: String = row.try_get("asset_x_amount")?;
    let asset_y: String = row.try_get("asset_y_amount")?;
    let status: String = row.try_get("status")?;
    let share_baseline: String = row.try_get("share_baseline")?;

    Ok(Position {
        id: PositionId(parse_uuid(&id)?),
        pool_address: row.try_get("pool_address")?,
        owner_address: row.try_get("owner_address")?,
        bin_ids: bin_ids.into_iter().collect(),
        asset_x_amount: parse_decimal(&asset_x)?,
        asset_y_amount: parse_decimal(&asset_y)?,
        status: PositionStatus::from_str(&status)?,
        opened_at: row.try_get::<DateTime<Utc>, _>("opened_at")?,
        closed_at: row.try_get::<Option<DateTime<Utc>>, _>("closed_at")?,
        last_tx_hash: row.try_get("last_tx_hash")?,
        failure: row.try_get("failure")?,
        share_baseline: serde_json::from_str(&share_baseline)?,
    })
}

fn operation_from_row(row: &SqliteRow) -> Result<OperationRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let position_id: Option<String> = row.try_get("position_id")?;
    let bin_ids: String = row.try_get("bin_ids")?;
    let amount_x: String = row.try_get("amount_x")?;
    let amount_y: String = row.try_get("amount_y")?;

    Ok(OperationRecord {
        id: parse_uuid(&id)?,
        kind: OperationKind::from_str(&kind)?,
        position_id: position_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(PositionId),
        bin_ids: serde_json::from_str(&bin_ids)?,
        amount_x: parse_decimal(&amount_x)?,
        amount_y: parse_decimal(&amount_y)?,
        tx_hash: row.try_get("tx_hash")?,
        recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
        note: row.try_get("note")?,
    })
}

fn map_write_error(err: sqlx::Error, pool_address: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::OpenPositionExists(pool_address.to_string())
        }
        _ => StoreError::Database(err),
    }
}

/// SQLite implementation of [`PositionStore`].
#[derive(Clone)]
pub struct SqlitePositionRepository {
    pool: Arc<SqlitePool>,
}

impl SqlitePositionRepository {
    /// Creates a new SqlitePositionRepository.
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Finds a position by its ID.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn find_by_id(&self, id: &PositionId) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }
}

#[async_trait]
impl PositionStore for SqlitePositionRepository {
    async fn insert(&self, position: &Position) -> Result<(), StoreError> {
        let bin_ids = serde_json::to_string(&position.bin_ids_vec())?;
        let share_baseline = serde_json::to_string(&position.share_baseline)?;
        sqlx::query(
            r#"
            INSERT INTO positions (id, pool_address, owner_address, bin_ids,
                                   asset_x_amount, asset_y_amount, status,
                                   opened_at, closed_at, last_tx_hash, failure,
                                   share_baseline)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.id.to_string())
        .bind(&position.pool_address)
        .bind(&position.owner_address)
        .bind(bin_ids)
        .bind(position.asset_x_amount.to_string())
        .bind(position.asset_y_amount.to_string())
        .bind(position.status.as_str())
        .bind(position.opened_at)
        .bind(position.closed_at)
        .bind(&position.last_tx_hash)
        .bind(&position.failure)
        .bind(share_baseline)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| map_write_error(e, &position.pool_address))?;

        debug!(id = %position.id, status = %position.status, "Inserted position");
        Ok(())
    }

    async fn update(&self, position: &Position) -> Result<(), StoreError> {
        let bin_ids = serde_json::to_string(&position.bin_ids_vec())?;
        let result = sqlx::query(
            r#"
            UPDATE positions
               SET bin_ids = ?, asset_x_amount = ?, asset_y_amount = ?, status = ?,
                   closed_at = ?, last_tx_hash = ?, failure = ?
             WHERE id = ?
            "#,
        )
        .bind(bin_ids)
        .bind(position.asset_x_amount.to_string())
        .bind(position.asset_y_amount.to_string())
        .bind(position.status.as_str())
        .bind(position.closed_at)
        .bind(&position.last_tx_hash)
        .bind(&position.failure)
        .bind(position.id.to_string())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| map_write_error(e, &position.pool_address))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(position.id.to_string()));
        }
        debug!(id = %position.id, status = %position.status, "Updated position");
        Ok(())
    }

    async fn current(&self, pool_address: &str) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM positions WHERE pool_address = ? AND status != 'CLOSED' LIMIT 1",
        )
        .bind(pool_address)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn history(&self, pool_address: &str, limit: u32) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM positions WHERE pool_address = ? ORDER BY rowid DESC LIMIT ?",
        )
        .bind(pool_address)
        .bind(i64::from(limit))
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn record_operation(&self, operation: &OperationRecord) -> Result<(), StoreError> {
        let bin_ids = serde_json::to_string(&operation.bin_ids)?;
        sqlx::query(
            r#"
            INSERT INTO operations (id, kind, position_id, bin_ids, amount_x, amount_y,
                                    tx_hash, recorded_at, note)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(operation.id.to_string())
        .bind(operation.kind.as_str())
        .bind(operation.position_id.as_ref().map(|id| id.to_string()))
        .bind(bin_ids)
        .bind(operation.amount_x.to_string())
        .bind(operation.amount_y.to_string())
        .bind(&operation.tx_hash)
        .bind(operation.recorded_at)
        .bind(&operation.note)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn operations(&self, limit: u32) -> Result<Vec<OperationRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM operations ORDER BY rowid DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(operation_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::Database;
    use lb_lp_domain::entities::{PlannedBin, PositionPlan};
    use lb_lp_domain::enums::Asset;
    use primitive_types::U256;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    const POOL: &str = "0x856b38bf1e2e367f747dd4d3951dda8a35f1bf60";

    fn plan() -> PositionPlan {
        PositionPlan::new(
            100,
            vec![
                PlannedBin {
                    bin_id: 101,
                    asset: Asset::X,
                    amount: dec!(5.25),
                },
                PlannedBin {
                    bin_id: 99,
                    asset: Asset::Y,
                    amount: dec!(0.00012345),
                },
            ],
        )
    }

    async fn repo(dir: &tempfile::TempDir) -> SqlitePositionRepository {
        let path = dir.path().join("positions.db");
        let db = Database::connect(path.to_str().unwrap()).await.unwrap();
        db.migrate().await.unwrap();
        db.positions()
    }

    #[tokio::test]
    async fn test_insert_and_current_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let position = Position::pending(POOL, "0xowner", &plan());

        repo.insert(&position).await.unwrap();
        let current = repo.current(POOL).await.unwrap().unwrap();

        assert_eq!(current.id, position.id);
        assert_eq!(current.bin_ids_vec(), vec![99, 101]);
        assert_eq!(current.asset_x_amount, dec!(5.25));
        assert_eq!(current.asset_y_amount, dec!(0.00012345));
        assert_eq!(current.status, PositionStatus::Pending);
        assert!(current.share_baseline.is_empty());
    }

    #[tokio::test]
    async fn test_share_baseline_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let baseline = BTreeMap::from([(101, U256::from(250)), (99, U256::MAX)]);
        let position = Position::pending(POOL, "0xowner", &plan()).with_share_baseline(baseline);

        repo.insert(&position).await.unwrap();
        let current = repo.current(POOL).await.unwrap().unwrap();

        assert_eq!(current.share_baseline, position.share_baseline);
    }

    #[tokio::test]
    async fn test_rejects_second_open_position() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        repo.insert(&Position::pending(POOL, "0xowner", &plan()))
            .await
            .unwrap();

        let err = repo
            .insert(&Position::pending(POOL, "0xowner", &plan()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OpenPositionExists(_)));
    }

    #[tokio::test]
    async fn test_closed_position_frees_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let mut first = Position::pending(POOL, "0xowner", &plan());
        repo.insert(&first).await.unwrap();
        first.activate(Some("0xa".into())).unwrap();
        first.begin_withdraw().unwrap();
        first.close(Some("0xb".into())).unwrap();
        repo.update(&first).await.unwrap();

        assert!(repo.current(POOL).await.unwrap().is_none());
        let second = Position::pending(POOL, "0xowner", &plan());
        repo.insert(&second).await.unwrap();

        let history = repo.history(POOL, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].status, PositionStatus::Closed);
        assert_eq!(history[1].last_tx_hash.as_deref(), Some("0xb"));
        assert!(history[1].closed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_position() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let position = Position::pending(POOL, "0xowner", &plan());
        let err = repo.update(&position).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failure_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut position = Position::pending(POOL, "0xowner", &plan());
        {
            let repo = repo(&dir).await;
            repo.insert(&position).await.unwrap();
            position.mark_failed("reverted");
            repo.update(&position).await.unwrap();
        }

        let repo = repo(&dir).await;
        let current = repo.current(POOL).await.unwrap().unwrap();
        assert_eq!(current.failure.as_deref(), Some("reverted"));
        assert_eq!(repo.find_by_id(&position.id).await.unwrap(), Some(current));
    }

    #[tokio::test]
    async fn test_operations_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir).await;
        let position = Position::pending(POOL, "0xowner", &plan());
        repo.insert(&position).await.unwrap();

        let add = OperationRecord::new(OperationKind::Add, vec![99, 101])
            .for_position(&position.id)
            .with_amounts(dec!(5.25), dec!(0.0001))
            .with_tx(Some("0xadd".into()));
        let manual = OperationRecord::new(OperationKind::Remove, vec![120]).with_note("manual");
        repo.record_operation(&add).await.unwrap();
        repo.record_operation(&manual).await.unwrap();

        let ops = repo.operations(10).await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].id, manual.id);
        assert!(ops[0].position_id.is_none());
        assert_eq!(ops[1].position_id, Some(position.id.clone()));
        assert_eq!(ops[1].amount_x, dec!(5.25));
        assert_eq!(ops[1].tx_hash.as_deref(), Some("0xadd"));
    }
}
