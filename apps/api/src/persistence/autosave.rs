//! Debounced auto-save.
//!
//! Every mutation hands the saver a `(revision, Document)` pair. The saver waits for
//! a quiet period; any newer pair arriving first replaces the pending one and restarts
//! the wait. So there is at most one pending save, and what gets written is always the
//! latest state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{PersistenceAdapter, StorageError};
use crate::document::Document;

/// Default quiet period before an auto-save fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// The newest revision known to be persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveStatus {
    pub revision: u64,
    pub last_saved: Option<DateTime<Utc>>,
}

/// Shared between a session (manual saves, status reads) and its saver task.
#[derive(Clone)]
pub struct SaveTracker {
    tx: Arc<watch::Sender<SaveStatus>>,
}

impl SaveTracker {
    pub fn new(initial: SaveStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn status(&self) -> SaveStatus {
        *self.tx.borrow()
    }

    /// Records a completed save. Older revisions never overwrite newer ones.
    pub fn record(&self, revision: u64, at: DateTime<Utc>) {
        self.tx.send_modify(|status| {
            if revision >= status.revision {
                *status = SaveStatus {
                    revision,
                    last_saved: Some(at),
                };
            }
        });
    }

    /// Forgets the last save, e.g. after the snapshot was cleared.
    pub fn reset(&self, revision: u64) {
        self.tx.send_replace(SaveStatus {
            revision,
            last_saved: None,
        });
    }
}

struct Pending {
    revision: u64,
    document: Document,
}

/// Handle to a per-session saver task.
pub struct AutoSaver {
    tx: mpsc::UnboundedSender<Pending>,
    task: JoinHandle<()>,
}

impl AutoSaver {
    pub fn spawn(
        adapter: Arc<PersistenceAdapter>,
        tracker: SaveTracker,
        debounce: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_saver(rx, adapter, tracker, debounce));
        Self { tx, task }
    }

    /// Cancels any pending save and schedules this one after the quiet period.
    pub fn schedule(&self, revision: u64, document: Document) {
        if self.tx.send(Pending { revision, document }).is_err() {
            warn!("Auto-save task has stopped; revision {revision} not scheduled");
        }
    }

    /// Stops the saver, writing any pending change first.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!("Auto-save task ended abnormally: {e}");
        }
    }
}

async fn run_saver(
    mut rx: mpsc::UnboundedReceiver<Pending>,
    adapter: Arc<PersistenceAdapter>,
    tracker: SaveTracker,
    debounce: Duration,
) {
    while let Some(mut pending) = rx.recv().await {
        let mut closed = false;

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(newer) => pending = newer,
                    None => {
                        closed = true;
                        break;
                    }
                },
                _ = tokio::time::sleep(debounce) => break,
            }
        }

        save_if_stale(&adapter, &tracker, pending).await;

        if closed {
            break;
        }
    }
    debug!("Auto-save task for {} stopped", adapter.key());
}

async fn save_if_stale(adapter: &PersistenceAdapter, tracker: &SaveTracker, pending: Pending) {
    if tracker.status().revision >= pending.revision {
        debug!("Revision {} already persisted; skipping auto-save", pending.revision);
        return;
    }

    match adapter.save(&pending.document).await {
        Ok(at) => tracker.record(pending.revision, at),
        // Already reported once when availability was probed.
        Err(StorageError::Unavailable) => {}
        Err(e) => warn!("Auto-save of revision {} failed: {e}", pending.revision),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, Arc<PersistenceAdapter>, SaveTracker) {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(PersistenceAdapter::new(store.clone(), "s1"));
        let tracker = SaveTracker::new(SaveStatus::default());
        (store, adapter, tracker)
    }

    fn doc(content: &str) -> Document {
        let mut doc = Document::new();
        doc.update_content(content);
        doc
    }

    async fn stored_content(store: &MemoryStore) -> String {
        let raw = store.get("s1:resumeBuilder_data").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["pages"][0]["content"].as_str().unwrap().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_fires_after_quiet_period() {
        let (store, adapter, tracker) = setup();
        let saver = AutoSaver::spawn(adapter, tracker.clone(), DEFAULT_DEBOUNCE);

        saver.schedule(1, doc("<p>v1</p>"));
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(store.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.write_count(), 1);
        assert_eq!(tracker.status().revision, 1);
        assert!(tracker.status().last_saved.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_before_deadline_supersedes_pending_save() {
        let (store, adapter, tracker) = setup();
        let saver = AutoSaver::spawn(adapter, tracker.clone(), DEFAULT_DEBOUNCE);

        saver.schedule(1, doc("<p>draft</p>"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        saver.schedule(2, doc("<p>final</p>"));

        // The first save would have fired at T+2s.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.write_count(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.write_count(), 1);
        assert_eq!(stored_content(&store).await, "<p>final</p>");
        assert_eq!(tracker.status().revision, 2);

        // Nothing else is pending.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_save_per_quiet_period() {
        let (store, adapter, tracker) = setup();
        let saver = AutoSaver::spawn(adapter, tracker, DEFAULT_DEBOUNCE);

        for revision in 1..=5 {
            saver.schedule(revision, doc(&format!("<p>{revision}</p>")));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.write_count(), 1);

        saver.schedule(6, doc("<p>6</p>"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.write_count(), 2);
        assert_eq!(stored_content(&store).await, "<p>6</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_makes_pending_auto_save_a_no_op() {
        let (store, adapter, tracker) = setup();
        let saver = AutoSaver::spawn(adapter.clone(), tracker.clone(), DEFAULT_DEBOUNCE);

        let current = doc("<p>now</p>");
        saver.schedule(3, current.clone());
        let at = adapter.save(&current).await.unwrap();
        tracker.record(3, at);
        assert_eq!(store.write_count(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_change() {
        let (store, adapter, tracker) = setup();
        let saver = AutoSaver::spawn(adapter, tracker.clone(), DEFAULT_DEBOUNCE);

        saver.schedule(1, doc("<p>unsaved</p>"));
        saver.shutdown().await;

        assert_eq!(store.write_count(), 1);
        assert_eq!(stored_content(&store).await, "<p>unsaved</p>");
    }

    #[test]
    fn test_tracker_ignores_older_revisions() {
        let tracker = SaveTracker::new(SaveStatus::default());
        let now = Utc::now();
        tracker.record(5, now);
        tracker.record(3, now);
        assert_eq!(tracker.status().revision, 5);

        tracker.reset(6);
        assert_eq!(tracker.status(), SaveStatus { revision: 6, last_saved: None });
    }
}
