mod errors;
mod memory;
mod redis;

pub use errors::{CacheError, CacheResult};
pub use memory::{MemoryCache, StoredEntry};
pub use redis::RedisCache;
