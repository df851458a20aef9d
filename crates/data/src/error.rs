use lb_lp_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an open position already exists for pool {0}")]
    OpenPositionExists(String),

    #[error("position {0} not found")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
