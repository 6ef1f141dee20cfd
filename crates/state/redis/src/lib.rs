//! Redis state backend for Provisor.
//!
//! Provides a Redis-backed [`StateStore`] so idempotency records survive
//! worker restarts and are shared by every worker reading the same inbound
//! source.
//!
//! Each record lives in one Redis hash with fields `v` (value) and `ver`
//! (version). Every mutation runs as a Lua script, so the check and the write
//! happen atomically on the server. Retention relies on native key expiry.
//!
//! ```ignore
//! use provisor_state_redis::{RedisConfig, RedisStateStore};
//!
//! let store = RedisStateStore::new(&RedisConfig::default())?;
//! ```
//!
//! [`StateStore`]: provisor_state::StateStore

mod config;
mod key_render;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisStateStore;
