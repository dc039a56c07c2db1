//! Document Model: the ordered pages of a resume plus the editor cursor.
//!
//! # Invariants
//! - A document always holds at least one page.
//! - `selected` is always a valid index into `pages`.
//!
//! Page ids are opaque. New pages get the creation-time millisecond timestamp, forced
//! above every numeric id already in the document so two pages created in the same
//! millisecond cannot collide. Restored pages keep whatever id they were saved with.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::templates::Template;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Any JSON value a snapshot carried as a page id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(serde_json::Value);

impl PageId {
    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }
}

impl From<i64> for PageId {
    fn from(id: i64) -> Self {
        PageId(id.into())
    }
}

impl From<serde_json::Value> for PageId {
    fn from(value: serde_json::Value) -> Self {
        PageId(value)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of resume content, exported as one physical page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub id: PageId,
    /// Rich-text HTML fragment produced by the editor.
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("You need at least one page")]
    LastPage,

    #[error("Page {index} does not exist (document has {len} pages)")]
    PageOutOfRange { index: usize, len: usize },
}

/// The full in-memory resume being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pages: Vec<Page>,
    selected: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document with a single empty page, selected.
    pub fn new() -> Self {
        Self {
            pages: vec![Page {
                id: Utc::now().timestamp_millis().into(),
                content: String::new(),
            }],
            selected: 0,
        }
    }

    /// Rebuilds a document from persisted parts.
    ///
    /// Returns `None` for an empty page list. An out-of-range selection is clamped
    /// to the last page.
    pub fn from_parts(pages: Vec<Page>, selected: usize) -> Option<Self> {
        if pages.is_empty() {
            return None;
        }
        let selected = selected.min(pages.len() - 1);
        Some(Self { pages, selected })
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page(&self) -> &Page {
        &self.pages[self.selected]
    }

    /// Appends an empty page and moves the cursor onto it.
    pub fn add_page(&mut self) -> &Page {
        let page = Page {
            id: self.next_page_id(),
            content: String::new(),
        };
        self.pages.push(page);
        self.selected = self.pages.len() - 1;
        &self.pages[self.selected]
    }

    pub fn select_page(&mut self, index: usize) -> Result<(), DocumentError> {
        self.check_index(index)?;
        self.selected = index;
        Ok(())
    }

    /// Replaces the HTML of the selected page.
    pub fn update_content(&mut self, content: impl Into<String>) {
        self.pages[self.selected].content = content.into();
    }

    /// Removes a page, keeping the cursor on a valid page.
    ///
    /// Rejected when it is the last remaining page. The cursor moves back one slot
    /// when a page before it is removed, and onto the new last page when it pointed
    /// past the end.
    pub fn delete_page(&mut self, index: usize) -> Result<Page, DocumentError> {
        self.check_index(index)?;
        if self.pages.len() <= 1 {
            return Err(DocumentError::LastPage);
        }

        let removed = self.pages.remove(index);
        if self.selected >= self.pages.len() {
            self.selected = self.pages.len() - 1;
        } else if self.selected > index {
            self.selected -= 1;
        }
        Ok(removed)
    }

    /// Replaces the whole document with a single page holding the template content.
    pub fn apply_template(&mut self, template: &Template) {
        let id = self.next_page_id();
        self.pages = vec![Page {
            id,
            content: template.content.to_string(),
        }];
        self.selected = 0;
    }

    fn check_index(&self, index: usize) -> Result<(), DocumentError> {
        if index >= self.pages.len() {
            return Err(DocumentError::PageOutOfRange {
                index,
                len: self.pages.len(),
            });
        }
        Ok(())
    }

    /// Ids saturate at `i64::MAX`; only a restored id that large can force a repeat.
    fn next_page_id(&self) -> PageId {
        let now = Utc::now().timestamp_millis();
        let last = self
            .pages
            .iter()
            .filter_map(|p| p.id.as_i64())
            .max()
            .unwrap_or(i64::MIN);
        if now > last {
            now.into()
        } else {
            last.saturating_add(1).into()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
