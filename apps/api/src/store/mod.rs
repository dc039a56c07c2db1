//! Key-value storage behind the persistence adapter and the upstream token cache.
//!
//! Two backends ship with the service: [`MemoryStore`] (default, and the fake used in
//! tests) and [`RedisStore`]. `AppState` holds an `Arc<dyn KeyValueStore>` chosen at
//! startup from `REDIS_URL`.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// String-keyed, string-valued storage. Writes replace the whole value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

const PROBE_KEY: &str = "__storage_probe__";

/// Checks that the store accepts a write and a delete.
pub async fn probe(store: &dyn KeyValueStore) -> bool {
    if let Err(e) = store.set(PROBE_KEY, PROBE_KEY).await {
        tracing::debug!("Storage probe write failed: {e}");
        return false;
    }
    store.remove(PROBE_KEY).await.is_ok()
}
