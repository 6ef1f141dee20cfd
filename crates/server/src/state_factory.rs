use std::sync::Arc;

use provisor_state::StateStore;
use provisor_state_memory::MemoryStateStore;
#[cfg(feature = "redis")]
use provisor_state_redis::{RedisConfig, RedisStateStore};
use tracing::{info, warn};

use crate::config::StateConfig;
use crate::error::ServerError;

/// Construct the idempotency store from configuration.
///
/// A freshly built store is pinged once; an unreachable backend is logged but
/// not fatal, since the worker defers messages until it comes back.
pub async fn create_state(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    let store = match config.backend.as_str() {
        "memory" => create_memory(),
        #[cfg(feature = "redis")]
        "redis" => create_redis(config)?,
        other => {
            return Err(ServerError::Config(format!(
                "unsupported state backend: {other} (is the feature enabled?)"
            )));
        }
    };

    match store.ping().await {
        Ok(()) => info!(backend = %config.backend, "idempotency store ready"),
        Err(e) => warn!(backend = %config.backend, error = %e, "idempotency store unreachable"),
    }
    Ok(store)
}

fn create_memory() -> Arc<dyn StateStore> {
    Arc::new(MemoryStateStore::new())
}

#[cfg(feature = "redis")]
fn create_redis(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    let url = config.url.as_deref().unwrap_or("redis://127.0.0.1:6379");
    let mut redis_config = RedisConfig::new(url);
    if let Some(prefix) = &config.prefix {
        redis_config.prefix.clone_from(prefix);
    }
    let store = RedisStateStore::new(&redis_config)
        .map_err(|e| ServerError::Config(format!("redis store: {e}")))?;
    Ok(Arc::new(store))
}
