//! Export Gate: one export per session at a time.
//!
//! `Idle → Exporting(kind) → Idle | Failed`. A second request while `Exporting` is
//! rejected immediately. The gate is released when the [`ExportTicket`] drops, so an
//! early return or panic in the export path cannot leave it stuck.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use super::{ExportError, ExportKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExportState {
    #[default]
    Idle,
    Exporting { kind: ExportKind },
    Failed { kind: ExportKind, reason: String },
}

#[derive(Clone, Default)]
pub struct ExportGate {
    state: Arc<Mutex<ExportState>>,
}

impl ExportGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ExportState {
        self.lock().clone()
    }

    /// Moves to `Exporting(kind)`, or fails if an export is already in flight.
    /// A previous failure does not block a new attempt.
    pub fn try_begin(&self, kind: ExportKind) -> Result<ExportTicket, ExportError> {
        let mut state = self.lock();
        if let ExportState::Exporting { kind: running } = *state {
            debug!("Rejecting {kind} export; {running} export in progress");
            return Err(ExportError::AlreadyRunning(running));
        }
        *state = ExportState::Exporting { kind };
        Ok(ExportTicket {
            gate: self.clone(),
            kind,
            failure: None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ExportState> {
        // State is a plain enum; a poisoned lock still holds a valid value.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held for the duration of one export.
pub struct ExportTicket {
    gate: ExportGate,
    kind: ExportKind,
    failure: Option<String>,
}

impl ExportTicket {
    /// Marks the export as failed; the gate moves to `Failed` on release.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }
}

impl Drop for ExportTicket {
    fn drop(&mut self) {
        let next = match self.failure.take() {
            Some(reason) => {
                warn!("{} export failed: {reason}", self.kind);
                ExportState::Failed {
                    kind: self.kind,
                    reason,
                }
            }
            None => ExportState::Idle,
        };
        *self.gate.lock() = next;
    }
}
