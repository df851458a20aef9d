//! Repository implementations for database persistence.
//!
//! This module provides the SQLite-backed position store and the connection
//! wrapper that owns migrations.

mod position_repository;

pub use position_repository::SqlitePositionRepository;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tracing::info;

/// Database connection wrapper for repositories.
#[derive(Clone)]
pub struct Database {
    pool: Arc<SqlitePool>,
}

impl Database {
    /// Creates a new Database wrapper from a connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Opens (creating if missing) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub async fn connect(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!(path, "Opened position database");
        Ok(Self::new(pool))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates a SqlitePositionRepository instance.
    #[must_use]
    pub fn positions(&self) -> SqlitePositionRepository {
        SqlitePositionRepository::new(self.pool.clone())
    }

    /// Runs database migrations.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(include_str!("../../migrations/001_initial_schema.sql"))
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
