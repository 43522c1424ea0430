use thiserror::Error;

use crate::domain::RevocationReason;

pub type RevocationResult<T> = Result<T, RevocationError>;

/// Errors that make a whole revocation batch meaningless.
///
/// Per-serial failures never surface here; they are logged and counted.
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("parallelism must be at least 1, got {0}")]
    InvalidParallelism(usize),

    #[error("skipping the blocked-key entry requires reason KeyCompromise, got {0}")]
    SkipBlockKeyRequiresKeyCompromise(RevocationReason),

    #[error("revocation worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
