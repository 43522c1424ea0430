use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use redis::{
    Client as RedisClient, RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub authority: Option<AuthorityConfig>,
    #[serde(default)]
    pub issuers: Vec<IssuerConfig>,
    pub revocation: RevocationConfig,
    pub backfill: BackfillConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: SecretString,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub uri: SecretString,
}

impl RedisConfig {
    /// Establishes a new Redis connection based on the provided URI.
    ///
    /// - To enable TLS, the URI must use the `rediss://` scheme.
    /// - To enable insecure TLS, the URI must use the `rediss://` scheme and end with `/#insecure`.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn start(&self) -> RedisResult<ConnectionManager> {
        let client = RedisClient::open(self.uri.expose_secret())?;
        let config = ConnectionManagerConfig::new().set_connection_timeout(Duration::from_secs(60));
        client.get_connection_manager_with_config(config).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    pub url: String,
    pub admin_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    pub cert_file: PathBuf,
    pub short_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationConfig {
    pub parallelism: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub batch_size: usize,
    pub parallelism: usize,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("revocation.parallelism", 10)?
            .set_default("backfill.batch_size", 1000)?
            .set_default("backfill.parallelism", 10)?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_REVOCATION__PARALLELISM or APP_REDIS__URI
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config =
            Config::load_with_sources(Some(HashMap::new())).expect("Failed to load config");

        assert_eq!(config.revocation.parallelism, 10);
        assert_eq!(config.backfill.batch_size, 1000);
        assert_eq!(config.backfill.parallelism, 10);
        assert!(config.backfill.ttl_secs.is_none());
        assert!(config.database.is_none());
        assert!(config.redis.is_none());
        assert!(config.issuers.is_empty());
    }

    #[test]
    fn test_env_config() {
        let mut env_vars = HashMap::new();
        env_vars.insert("revocation.parallelism".to_string(), "4".to_string());
        env_vars.insert(
            "database.url".to_string(),
            "mysql://admin@localhost:3306/ca".to_string(),
        );
        env_vars.insert(
            "redis.uri".to_string(),
            "rediss://localhost:6379".to_string(),
        );
        env_vars.insert(
            "authority.url".to_string(),
            "http://localhost:9090".to_string(),
        );
        env_vars.insert("authority.admin_name".to_string(), "ops".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.revocation.parallelism, 4);
        let database = config.database.unwrap();
        assert_eq!(
            database.url.expose_secret(),
            "mysql://admin@localhost:3306/ca"
        );
        assert_eq!(database.max_connections, 10);
        assert_eq!(
            config.redis.unwrap().uri.expose_secret(),
            "rediss://localhost:6379"
        );
        let authority = config.authority.unwrap();
        assert_eq!(authority.admin_name, "ops");
        assert_eq!(authority.timeout_secs, 30);
    }

    #[test]
    fn test_partial_env_override() {
        let mut env_vars = HashMap::new();
        // We just override the backfill ttl
        env_vars.insert("backfill.ttl_secs".to_string(), "3600".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.backfill.ttl_secs, Some(3600));
        // The other values should use default
        assert_eq!(config.backfill.batch_size, 1000);
        assert_eq!(config.revocation.parallelism, 10);
    }
}
