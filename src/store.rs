use thiserror::Error;

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the registration and status stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid incident table name {0:?}")]
    InvalidIncidentTable(String),

    #[error("unknown incident table {0:?}")]
    UnknownIncident(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
