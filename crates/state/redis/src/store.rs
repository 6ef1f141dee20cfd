use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use provisor_state::error::StateError;
use provisor_state::key::StateKey;
use provisor_state::store::{CasResult, StateStore, Versioned};

use crate::config::RedisConfig;
use crate::key_render::render_key;
use crate::scripts;

fn backend(e: &redis::RedisError) -> StateError {
    StateError::Backend(e.to_string())
}

fn ttl_millis(ttl: Option<Duration>) -> i64 {
    ttl.map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Redis-backed implementation of [`StateStore`].
///
/// Uses a `deadpool-redis` connection pool. Entries are Redis hashes with
/// fields `v` (value) and `ver` (version); all writes go through Lua scripts.
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
}

impl RedisStateStore {
    /// Create a new `RedisStateStore` from the provided configuration.
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let pool = Config::from_url(&config.url)
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Connection(e.to_string()))?
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn redis_key(&self, key: &StateKey) -> String {
        render_key(&self.prefix, key)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool
            .get()
            .await
            .map_err(|e| StateError::Connection(e.to_string()))
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let created: i64 = Script::new(scripts::CHECK_AND_SET)
            .key(self.redis_key(key))
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        Ok(created == 1)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let mut conn = self.conn().await?;
        conn.hget(self.redis_key(key), "v")
            .await
            .map_err(|e| backend(&e))
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        let mut conn = self.conn().await?;
        let (value, version): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(self.redis_key(key))
            .arg("v")
            .arg("ver")
            .query_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;

        Ok(value.map(|value| Versioned {
            value,
            version: version.unwrap_or(1),
        }))
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let mut conn = self.conn().await?;
        let _version: i64 = Script::new(scripts::SET_VERSIONED)
            .key(self.redis_key(key))
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = conn
            .del(self.redis_key(key))
            .await
            .map_err(|e| backend(&e))?;
        Ok(deleted > 0)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let mut conn = self.conn().await?;
        let reply: Vec<redis::Value> = Script::new(scripts::COMPARE_AND_SWAP)
            .key(self.redis_key(key))
            .arg(expected_version)
            .arg(new_value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;

        // Success: [1, new_version]
        // Conflict: [0, current_version, current_value | nil]
        let int_at = |i: usize| match reply.get(i) {
            Some(redis::Value::Int(n)) => Some(*n),
            _ => None,
        };
        let Some(status) = int_at(0) else {
            return Err(StateError::Backend("unexpected CAS script response".into()));
        };
        let version = int_at(1).and_then(|n| u64::try_from(n).ok()).unwrap_or(0);

        if status == 1 {
            return Ok(CasResult::Ok { version });
        }

        let current_value = match reply.get(2) {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        };
        Ok(CasResult::Conflict {
            current_value,
            current_version: version,
        })
    }

    async fn ping(&self) -> Result<(), StateError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_millis_maps_none_to_zero() {
        assert_eq!(ttl_millis(None), 0);
        assert_eq!(ttl_millis(Some(Duration::from_secs(2))), 2000);
    }

    #[test]
    fn pool_creation_does_not_connect() {
        let store = RedisStateStore::new(&RedisConfig::new("redis://127.0.0.1:1"));
        assert!(store.is_ok());
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("provisor-test-{}", uuid::Uuid::new_v4()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        let store = RedisStateStore::new(&test_config()).expect("pool creation should succeed");
        provisor_state::testing::run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn ping_reaches_server() {
        let store = RedisStateStore::new(&test_config()).expect("pool creation should succeed");
        store.ping().await.expect("ping should succeed");
    }
}
