//! Redis CONFIG_DB backend.
//!
//! Rows are Redis hashes stored under `TABLE|key`. Table enumeration uses
//! `KEYS *`, which is acceptable for CONFIG_DB sizes and matches how the
//! SONiC configuration tooling walks the database.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::{ConfigDbError, ConfigDbResult};
use crate::row::{FieldValue, FieldValues, KEY_SEPARATOR, NULL_FIELD};
use crate::store::{ConfigReader, ConfigStore};

/// Configuration for a Redis connection.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis server hostname or IP
    pub host: String,
    /// Redis server port
    pub port: u16,
    /// Redis database number
    pub db: u32,
}

impl RedisConfig {
    /// Creates a new Redis configuration.
    pub fn new(host: impl Into<String>, port: u16, db: u32) -> Self {
        Self {
            host: host.into(),
            port,
            db,
        }
    }

    /// Returns the Redis connection URI.
    pub fn uri(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Splits a Redis key into `(table, key)`. Keys without a separator are
/// not table rows.
fn split_redis_key(redis_key: &str) -> Option<(&str, &str)> {
    redis_key.split_once(KEY_SEPARATOR)
}

fn redis_key(table: &str, key: &str) -> String {
    format!("{}{}{}", table, KEY_SEPARATOR, key)
}

/// CONFIG_DB store backed by a Redis connection manager.
#[derive(Clone)]
pub struct RedisConfigStore {
    connection: ConnectionManager,
}

impl RedisConfigStore {
    /// Connects to the configured database.
    pub async fn connect(config: RedisConfig) -> ConfigDbResult<Self> {
        let uri = config.uri();

        let client = redis::Client::open(uri.clone())
            .map_err(|e| ConfigDbError::connection(&uri, e.to_string()))?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| ConfigDbError::connection(&uri, e.to_string()))?;

        info!("Connected to Redis: {}:{} (db={})", config.host, config.port, config.db);

        Ok(Self { connection })
    }
}

#[async_trait]
impl ConfigReader for RedisConfigStore {
    async fn tables(&self) -> ConfigDbResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn
            .keys("*")
            .await
            .map_err(|e| ConfigDbError::operation("keys", "*", "*", e.to_string()))?;

        let tables: BTreeSet<String> = keys
            .iter()
            .filter_map(|k| split_redis_key(k))
            .map(|(table, _)| table.to_string())
            .collect();

        debug!("Enumerated {} tables", tables.len());
        Ok(tables.into_iter().collect())
    }

    async fn keys(&self, table: &str) -> ConfigDbResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let pattern = redis_key(table, "*");
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| ConfigDbError::operation("keys", table, "*", e.to_string()))?;

        let mut keys: Vec<String> = keys
            .iter()
            .filter_map(|k| split_redis_key(k))
            .filter(|(t, _)| *t == table)
            .map(|(_, key)| key.to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, table: &str, key: &str) -> ConfigDbResult<Option<FieldValues>> {
        let mut conn = self.connection.clone();
        let fvs: HashMap<String, String> = conn
            .hgetall(redis_key(table, key))
            .await
            .map_err(|e| ConfigDbError::operation("hgetall", table, key, e.to_string()))?;

        if fvs.is_empty() {
            return Ok(None);
        }

        let mut fvs: FieldValues = fvs.into_iter().filter(|(f, _)| f != NULL_FIELD).collect();
        fvs.sort();
        Ok(Some(fvs))
    }
}

#[async_trait]
impl ConfigStore for RedisConfigStore {
    async fn set(&self, table: &str, key: &str, fvs: &[FieldValue]) -> ConfigDbResult<()> {
        let mut conn = self.connection.clone();
        let target = redis_key(table, key);

        let result: redis::RedisResult<()> = if fvs.is_empty() {
            conn.hset(&target, NULL_FIELD, NULL_FIELD).await
        } else {
            conn.hset_multiple(&target, fvs).await
        };
        result.map_err(|e| ConfigDbError::operation("hset", table, key, e.to_string()))?;

        debug!("HSET {} {:?}", target, fvs);
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> ConfigDbResult<()> {
        let mut conn = self.connection.clone();
        let target = redis_key(table, key);

        let _: () = conn
            .del(&target)
            .await
            .map_err(|e| ConfigDbError::operation("del", table, key, e.to_string()))?;

        debug!("DEL {}", target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::CONFIG_DB_ID;

    #[test]
    fn test_redis_config() {
        let config = RedisConfig::new("127.0.0.1", 6379, CONFIG_DB_ID);
        assert_eq!(config.db, 4);
        assert_eq!(config.uri(), "redis://127.0.0.1:6379/4");
    }

    #[test]
    fn test_split_redis_key() {
        assert_eq!(
            split_redis_key("VLAN_MEMBER|Vlan100|Ethernet0"),
            Some(("VLAN_MEMBER", "Vlan100|Ethernet0"))
        );
        assert_eq!(split_redis_key("CONFIG_DB_INITIALIZED"), None);
    }

    #[test]
    fn test_redis_key() {
        assert_eq!(redis_key("PORT", "Ethernet0"), "PORT|Ethernet0");
    }
}
