use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not initialized: run 'cadence init'")]
    NotInitialized,

    #[error("entity not found: {0}")]
    EntityNotFound(Uuid),

    #[error("entity already exists: {0}")]
    EntityExists(Uuid),

    #[error("account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("contact '{0}' is already being pursued on this account")]
    ContactExists(String),

    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("invalid tier '{0}': must be scorching, hot, warm, cool, cold, or unqualified")]
    InvalidTier(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
