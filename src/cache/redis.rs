use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::cache::{CacheError, CacheResult};
use crate::domain::DistributedCache;

/// A Redis-backed response cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Creates a new Redis cache from a connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

/// PSETEX rejects a zero expiry, so anything under a millisecond is refused here.
fn expiry_millis(ttl: Duration) -> CacheResult<u64> {
    match u64::try_from(ttl.as_millis()) {
        Ok(0) | Err(_) => Err(CacheError::InvalidTtl(ttl)),
        Ok(millis) => Ok(millis),
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let millis = expiry_millis(ttl)?;
        let mut conn = self.conn.clone();
        // PSETEX writes value and expiry in one command.
        let _: () = conn.pset_ex(key, value, millis).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let result = conn.get(key).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_millis() {
        assert_eq!(expiry_millis(Duration::from_secs(90)).unwrap(), 90_000);
        assert_eq!(expiry_millis(Duration::from_micros(1500)).unwrap(), 1);
        assert!(matches!(
            expiry_millis(Duration::from_micros(999)),
            Err(CacheError::InvalidTtl(_))
        ));
        assert!(matches!(
            expiry_millis(Duration::ZERO),
            Err(CacheError::InvalidTtl(_))
        ));
    }
}
