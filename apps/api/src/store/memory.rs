use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{KeyValueStore, StoreError};

/// Process-local store. Also doubles as the test fake: it counts writes and can be
/// switched into a failing mode to mimic a disabled or full store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    disabled: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every operation.
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.disabled.store(true, Ordering::SeqCst);
        store
    }

    /// Number of successful `set` calls, excluding the availability probe.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_enabled(&self) -> Result<(), StoreError> {
        if self.disabled.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still structurally valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_enabled()?;
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_enabled()?;
        self.entries().insert(key.to_string(), value.to_string());
        if key != super::PROBE_KEY {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_enabled()?;
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::probe;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_reflects_availability() {
        assert!(probe(&MemoryStore::new()).await);
        assert!(!probe(&MemoryStore::unavailable()).await);
    }

    #[tokio::test]
    async fn test_probe_does_not_count_as_write() {
        let store = MemoryStore::new();
        assert!(probe(&store).await);
        assert_eq!(store.write_count(), 0);
    }
}
