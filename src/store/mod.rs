//! The key-value capabilities the queue engine needs from its backing store.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`], a process-local store for tests and development
//! - `RedisStore` (feature `redis`), backed by a Redis server

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// List, set and plain key operations over a shared store.
///
/// Single-key operations are expected to be atomic on the store side.
/// Nothing here retries; connection failures surface as errors.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Appends `value` to the tail of the list at `key`, returning the new length.
    async fn append(&self, key: &str, value: Vec<u8>) -> Result<u64>;

    /// Removes and returns the head of the list, without waiting.
    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removes and returns the head of the list, waiting up to `timeout` for
    /// one to arrive. `Ok(None)` once the timeout has elapsed.
    async fn pop_blocking(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Length of the list at `key`; zero when the key does not exist.
    async fn length(&self, key: &str) -> Result<u64>;

    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool>;

    async fn add_member(&self, set_key: &str, member: &str) -> Result<()>;

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()>;

    /// Every member of the set, in no particular order.
    async fn members(&self, set_key: &str) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Names of every key starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes the given keys. Missing keys are ignored.
    async fn delete_keys(&self, keys: &[String]) -> Result<()>;

    /// Wipes the whole database. Meant for tests and operational resets.
    async fn flush_all(&self) -> Result<()>;
}
