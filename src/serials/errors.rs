use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::AccountId;
use crate::store::StoreError;

pub type SerialSourceResult<T> = Result<T, SerialSourceError>;

/// Failures that abort a whole serial resolution.
#[derive(Debug, Error)]
pub enum SerialSourceError {
    #[error("serial source unavailable: {0}")]
    SourceUnavailable(#[source] StoreError),

    #[error("no such incident: {0}")]
    UnknownIncident(#[source] StoreError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

impl From<StoreError> for SerialSourceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::InvalidIncidentTable(_) | StoreError::UnknownIncident(_) => {
                Self::UnknownIncident(error)
            }
            other => Self::SourceUnavailable(other),
        }
    }
}

impl From<openssl::error::ErrorStack> for SerialSourceError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        Self::InvalidKey(error.to_string())
    }
}
