use std::time::Duration;

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Failures writing to or reading from the response cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// The lifetime cannot be expressed as a whole, non-zero number of milliseconds.
    #[error("ttl {0:?} cannot be stored as an expiry")]
    InvalidTtl(Duration),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}
