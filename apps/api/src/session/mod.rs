//! Editor sessions: one open resume per session.
//!
//! A session owns its Document, the persistence adapter and auto-saver that mirror
//! it, the export gate, and the upstream client. Sessions live in the
//! [`SessionRegistry`] behind a per-session async mutex; exports clone the document
//! under the lock and run without it.
//!
//! Storage is scoped per session: the snapshot key is prefixed with the profile when
//! one was given (so a later session with the same profile restores it) and with the
//! session id otherwise. Upstream credentials are always prefixed with the session id.
//! Sessions untouched for longer than the idle timeout are closed by a sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{Document, DocumentError, Page};
use crate::export::{ExportError, ExportGate, ExportKind, ExportState, ExportTicket};
use crate::persistence::{AutoSaver, PersistenceAdapter, SaveStatus, SaveTracker, StorageError};
use crate::store::KeyValueStore;
use crate::templates::Template;
use crate::upstream::UpstreamClient;

pub mod handlers;

/// Everything a new session is built from.
#[derive(Clone)]
pub struct SessionFactory {
    pub store: Arc<dyn KeyValueStore>,
    pub http: reqwest::Client,
    pub upstream_url: String,
    pub autosave_debounce: Duration,
}

impl SessionFactory {
    /// Opens a session, restoring the saved snapshot when one exists.
    pub async fn open(&self, profile: Option<String>) -> EditorSession {
        let id = Uuid::new_v4();
        let scope = profile.clone().unwrap_or_else(|| id.to_string());
        let adapter = Arc::new(PersistenceAdapter::new(self.store.clone(), &scope));
        let storage_available = adapter.is_available().await;

        let (document, last_saved) = match adapter.load().await {
            Some(loaded) => (loaded.document, loaded.last_saved),
            None => (Document::new(), None),
        };

        let tracker = SaveTracker::new(SaveStatus {
            revision: 0,
            last_saved,
        });
        let saver = AutoSaver::spawn(adapter.clone(), tracker.clone(), self.autosave_debounce);

        let upstream = UpstreamClient::new(self.http.clone(), &self.upstream_url, self.store.clone())
            .scoped(id.to_string());

        info!(
            "Opened session {id} ({} pages, storage {})",
            document.len(),
            if storage_available { "available" } else { "unavailable" }
        );

        EditorSession {
            id,
            profile,
            document,
            revision: 0,
            adapter,
            saver: Some(saver),
            tracker,
            gate: ExportGate::new(),
            upstream,
            storage_available,
        }
    }
}

pub struct EditorSession {
    id: Uuid,
    profile: Option<String>,
    document: Document,
    /// Bumped on every mutation; compared against the saved revision.
    revision: u64,
    adapter: Arc<PersistenceAdapter>,
    /// `None` once the session is closed.
    saver: Option<AutoSaver>,
    tracker: SaveTracker,
    gate: ExportGate,
    upstream: UpstreamClient,
    storage_available: bool,
}

/// What clients see of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub profile: Option<String>,
    pub pages: Vec<Page>,
    pub selected_page_index: usize,
    pub revision: u64,
    pub last_saved: Option<DateTime<Utc>>,
    pub has_unsaved_changes: bool,
    pub storage_available: bool,
    pub export: ExportState,
}

impl EditorSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.revision > self.tracker.status().revision
    }

    pub fn view(&self) -> SessionView {
        let status = self.tracker.status();
        SessionView {
            id: self.id,
            profile: self.profile.clone(),
            pages: self.document.pages().to_vec(),
            selected_page_index: self.document.selected_index(),
            revision: self.revision,
            last_saved: status.last_saved,
            has_unsaved_changes: self.has_unsaved_changes(),
            storage_available: self.storage_available,
            export: self.gate.state(),
        }
    }

    // ── Editing ─────────────────────────────────────────────────────────────

    pub fn add_page(&mut self) {
        self.document.add_page();
        self.touch();
    }

    pub fn update_content(&mut self, content: String) {
        self.document.update_content(content);
        self.touch();
    }

    pub fn select_page(&mut self, index: usize) -> Result<(), DocumentError> {
        self.document.select_page(index)?;
        self.touch();
        Ok(())
    }

    pub fn delete_page(&mut self, index: usize) -> Result<Page, DocumentError> {
        let removed = self.document.delete_page(index)?;
        self.touch();
        Ok(removed)
    }

    pub fn apply_template(&mut self, template: &Template) {
        self.document.apply_template(template);
        info!("Session {} applied template '{}'", self.id, template.name);
        self.touch();
    }

    /// Records a mutation and (re)schedules the auto-save.
    fn touch(&mut self) {
        self.revision += 1;
        if let Some(saver) = self.saver.as_ref().filter(|_| self.storage_available) {
            saver.schedule(self.revision, self.document.clone());
        }
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Saves now. A pending auto-save for this revision or older becomes a no-op.
    pub async fn save(&mut self) -> Result<DateTime<Utc>, StorageError> {
        let at = self.adapter.save(&self.document).await?;
        self.tracker.record(self.revision, at);
        Ok(at)
    }

    /// Removes the saved snapshot and starts over from an empty document.
    ///
    /// The fresh document counts as saved: nothing is re-written until the next edit,
    /// and a pending auto-save of the old document is dropped.
    pub async fn clear_saved(&mut self) -> Result<(), StorageError> {
        self.adapter.clear().await?;
        self.document = Document::new();
        self.revision += 1;
        self.tracker.reset(self.revision);
        info!("Session {} cleared its saved document", self.id);
        Ok(())
    }

    // ── Export ──────────────────────────────────────────────────────────────

    /// Claims the export gate and snapshots the document to export.
    pub fn begin_export(&self, kind: ExportKind) -> Result<(ExportTicket, Document), ExportError> {
        let ticket = self.gate.try_begin(kind)?;
        Ok((ticket, self.document.clone()))
    }

    /// Stops the auto-saver after writing any pending change, and forgets the
    /// session's upstream credentials.
    pub async fn close(&mut self) {
        if let Some(saver) = self.saver.take() {
            saver.shutdown().await;
            self.upstream.clear_credentials().await;
            info!("Closed session {}", self.id);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

pub type SharedSession = Arc<Mutex<EditorSession>>;

/// How often the idle sweeper looks for expired sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    session: SharedSession,
    last_access: Instant,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: EditorSession) -> SharedSession {
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        let entry = Entry {
            session: shared.clone(),
            last_access: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        shared
    }

    /// Looks a session up and marks it as used.
    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_access = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.write().await.remove(&id).map(|entry| entry.session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Removes and closes every session unused for at least `max_idle`.
    /// Returns the evicted ids.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let expired: Vec<(Uuid, SharedSession)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_access.elapsed() >= max_idle)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry.session)))
                .collect()
        };

        for (id, session) in &expired {
            session.lock().await.close().await;
            info!("Evicted idle session {id}");
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    /// Runs [`evict_idle`](Self::evict_idle) every `every` until the runtime stops.
    pub fn spawn_idle_sweeper(&self, max_idle: Duration, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let evicted = registry.evict_idle(max_idle).await;
                if evicted.is_empty() {
                    debug!("Idle sweep found nothing to evict");
                }
            }
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
