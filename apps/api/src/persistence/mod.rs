//! Persistence Adapter: mirrors a [`Document`] into a [`KeyValueStore`].
//!
//! The snapshot is written wholesale on every save and read wholesale on load; the
//! last writer wins. Failures never escape as panics: an unavailable store turns
//! saves into reported no-ops and loads into `None`, and the editor keeps working
//! from memory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::document::{Document, Page};
use crate::store::{self, KeyValueStore, StoreError};

pub mod autosave;

pub use autosave::{AutoSaver, SaveStatus, SaveTracker};

/// Storage key of the snapshot.
pub const STORAGE_KEY: &str = "resumeBuilder_data";
pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local storage is not available")]
    Unavailable,

    #[error("storage write failed: {0}")]
    Store(#[from] StoreError),

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The serialized form of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub pages: Vec<Page>,
    pub selected_page_index: usize,
    pub last_saved: DateTime<Utc>,
    pub version: String,
}

/// A document recovered from storage.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub last_saved: Option<DateTime<Utc>>,
}

pub struct PersistenceAdapter {
    store: Arc<dyn KeyValueStore>,
    key: String,
    available: OnceCell<bool>,
}

impl PersistenceAdapter {
    /// Adapter whose snapshot lives under `"{scope}:resumeBuilder_data"`.
    pub fn new(store: Arc<dyn KeyValueStore>, scope: &str) -> Self {
        Self {
            store,
            key: format!("{scope}:{STORAGE_KEY}"),
            available: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Probes the store once; later calls reuse the first answer.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let ok = store::probe(self.store.as_ref()).await;
                if !ok {
                    warn!("Storage is not available; auto-save disabled for {}", self.key);
                }
                ok
            })
            .await
    }

    /// Writes the full document. Returns the save timestamp recorded in the snapshot.
    pub async fn save(&self, document: &Document) -> Result<DateTime<Utc>, StorageError> {
        if !self.is_available().await {
            return Err(StorageError::Unavailable);
        }

        let snapshot = PersistedSnapshot {
            pages: document.pages().to_vec(),
            selected_page_index: document.selected_index(),
            last_saved: Utc::now(),
            version: FORMAT_VERSION.to_string(),
        };
        let json = serde_json::to_string(&snapshot)?;

        self.store.set(&self.key, &json).await.map_err(|e| {
            warn!("Failed to save snapshot {}: {e}", self.key);
            StorageError::Store(e)
        })?;

        debug!("Saved {} pages under {}", snapshot.pages.len(), self.key);
        Ok(snapshot.last_saved)
    }

    /// Reads the snapshot back. Missing, unreadable, or malformed snapshots yield `None`.
    pub async fn load(&self) -> Option<LoadedDocument> {
        if !self.is_available().await {
            return None;
        }

        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to load snapshot {}: {e}", self.key);
                return None;
            }
        };

        let loaded = parse_snapshot(&raw);
        match &loaded {
            Some(l) => info!("Restored {} pages from {}", l.document.len(), self.key),
            None => warn!("Discarding malformed snapshot under {}", self.key),
        }
        loaded
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        if !self.is_available().await {
            return Err(StorageError::Unavailable);
        }
        self.store.remove(&self.key).await?;
        info!("Cleared snapshot {}", self.key);
        Ok(())
    }
}

/// Only `pages` has to be a non-empty array. Every other field falls back to a
/// default instead of discarding the snapshot: ids are kept as-is, a missing or
/// non-string `content` reads as empty, a bad `selectedPageIndex` selects the first
/// page and an unparseable `lastSaved` reads as never saved.
fn parse_snapshot(raw: &str) -> Option<LoadedDocument> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let pages = value
        .get("pages")?
        .as_array()?
        .iter()
        .map(|page| Page {
            id: page.get("id").cloned().unwrap_or_default().into(),
            content: page
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .collect();
    let selected = value
        .get("selectedPageIndex")
        .and_then(Value::as_u64)
        .map_or(0, |index| usize::try_from(index).unwrap_or(usize::MAX));
    let last_saved = value
        .get("lastSaved")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    let document = Document::from_parts(pages, selected)?;
    Some(LoadedDocument {
        document,
        last_saved,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const KEY: &str = "s1:resumeBuilder_data";

    fn adapter(store: Arc<MemoryStore>) -> PersistenceAdapter {
        PersistenceAdapter::new(store, "s1")
    }

    fn three_page_document() -> Document {
        let mut doc = Document::new();
        doc.update_content("<h1>First</h1>");
        doc.add_page();
        doc.update_content("<p>Second</p>");
        doc.add_page();
        doc.update_content("<ul><li>Third</li></ul>");
        doc.select_page(1).unwrap();
        doc
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store.clone());
        let doc = three_page_document();

        let saved_at = adapter.save(&doc).await.unwrap();
        let loaded = adapter.load().await.unwrap();

        assert_eq!(loaded.document, doc);
        assert_eq!(loaded.document.selected_index(), 1);
        assert_eq!(loaded.last_saved, Some(saved_at));
    }

    #[tokio::test]
    async fn test_snapshot_json_shape() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store.clone());
        adapter.save(&three_page_document()).await.unwrap();

        let raw = store.get(KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["selectedPageIndex"], 1);
        assert_eq!(value["pages"].as_array().unwrap().len(), 3);
        assert!(value["pages"][0]["id"].is_i64());
        assert!(value["lastSaved"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_load_after_clear_is_none() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store);
        adapter.save(&three_page_document()).await.unwrap();
        adapter.clear().await.unwrap();
        assert!(adapter.load().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_snapshots_are_discarded() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store.clone());

        for raw in [
            "not json",
            r#"{"selectedPageIndex":0}"#,
            r#"{"pages":[],"selectedPageIndex":0}"#,
            r#"{"pages":"oops"}"#,
        ] {
            store.set(KEY, raw).await.unwrap();
            assert!(adapter.load().await.is_none(), "accepted {raw}");
        }
    }

    #[tokio::test]
    async fn test_load_tolerates_missing_optional_fields() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store.clone());
        store
            .set(KEY, r#"{"pages":[{"id":1},{"id":2,"content":"<p>x</p>"}]}"#)
            .await
            .unwrap();

        let loaded = adapter.load().await.unwrap();
        assert_eq!(loaded.document.len(), 2);
        assert_eq!(loaded.document.selected_index(), 0);
        assert_eq!(loaded.document.pages()[0].content, "");
        assert!(loaded.last_saved.is_none());
    }

    #[tokio::test]
    async fn test_load_keeps_content_despite_odd_fields() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store.clone());

        for raw in [
            r#"{"pages":[{"id":1,"content":"<p>keep me</p>"}],"selectedPageIndex":-1}"#,
            r#"{"pages":[{"id":1,"content":"<p>keep me</p>"}],"lastSaved":"yesterday"}"#,
            r#"{"pages":[{"id":"abc-1","content":"<p>keep me</p>"}]}"#,
            r#"{"pages":[{"id":1.5,"content":"<p>keep me</p>"}],"selectedPageIndex":"0"}"#,
        ] {
            store.set(KEY, raw).await.unwrap();
            let loaded = adapter.load().await.unwrap_or_else(|| panic!("discarded {raw}"));
            assert_eq!(loaded.document.pages()[0].content, "<p>keep me</p>", "{raw}");
            assert_eq!(loaded.document.selected_index(), 0);
            assert!(loaded.last_saved.is_none());
        }
    }

    #[tokio::test]
    async fn test_restored_string_id_is_saved_back_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store.clone());
        store
            .set(KEY, r#"{"pages":[{"id":"abc-1","content":"x"}]}"#)
            .await
            .unwrap();

        let loaded = adapter.load().await.unwrap();
        adapter.save(&loaded.document).await.unwrap();

        let raw = store.get(KEY).await.unwrap().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["pages"][0]["id"], "abc-1");
    }

    #[tokio::test]
    async fn test_unavailable_store_degrades_softly() {
        let adapter = adapter(Arc::new(MemoryStore::unavailable()));
        assert!(!adapter.is_available().await);
        assert!(matches!(
            adapter.save(&Document::new()).await,
            Err(StorageError::Unavailable)
        ));
        assert!(adapter.load().await.is_none());
        assert!(matches!(adapter.clear().await, Err(StorageError::Unavailable)));
    }

    #[tokio::test]
    async fn test_scopes_do_not_share_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let alice = PersistenceAdapter::new(store.clone(), "alice");
        let bob = PersistenceAdapter::new(store.clone(), "bob");

        alice.save(&three_page_document()).await.unwrap();

        assert_eq!(alice.key(), "alice:resumeBuilder_data");
        assert!(bob.load().await.is_none());
    }
}
