//! The per-browser edit history and the best-effort reversal of text edits.
//!
//! The log is a newest-first JSON array under a single storage key, capped
//! at [`MAX_ENTRIES`]. Reversal only ever rewrites a saved page body by
//! literal substring replacement; structural entries are informational.

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::page::PageId;
use crate::storage::{PersistedPages, Storage, StorageError};

pub const REVISION_LOG_KEY: &str = "csrd_version_edits";
pub const MAX_ENTRIES: usize = 200;
pub const EDIT_AUTHOR: &str = "CSRD Editor";
/// Content of a freshly keyed-in block. Edits starting from it are not
/// worth a log entry.
pub const EMPTY_LINE_PLACEHOLDER: &str = "<br>";

pub const REVERSE_PROMPT: &str = "Revert this specific text change?";
pub const DISCARD_PROMPT: &str =
    "WARNING: This will permanently delete ALL local edits, saved pages, and edit history. Proceed?";

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EditKind {
    Add,
    Delete,
    Save,
    Text,
}

impl EditKind {
    pub fn is_structural(self) -> bool {
        !matches!(self, EditKind::Text)
    }

    pub fn label(self) -> &'static str {
        match self {
            EditKind::Add => "ADD",
            EditKind::Delete => "DELETE",
            EditKind::Save => "SAVE",
            EditKind::Text => "TEXT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionEntry {
    /// ISO-8601 instant; doubles as the entry's key.
    pub timestamp: String,
    pub page: String,
    #[serde(rename = "type")]
    pub kind: EditKind,
    pub old_text: String,
    pub new_text: String,
    pub author: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevisionLog {
    entries: Vec<RevisionEntry>,
}

impl RevisionLog {
    pub fn load(storage: &dyn Storage) -> Self {
        let Some(raw) = storage.get(REVISION_LOG_KEY) else {
            return Self::default();
        };
        match serde_json::from_str::<Vec<RevisionEntry>>(&raw) {
            Ok(entries) => Self { entries },
            Err(err) => {
                tracing::warn!(error = %err, "revision log is unreadable, starting empty");
                Self::default()
            }
        }
    }

    pub fn store(&self, storage: &mut dyn Storage) -> Result<(), StorageError> {
        // Serializing plain strings cannot fail.
        let json = serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string());
        storage.set(REVISION_LOG_KEY, &json)
    }

    pub fn entries(&self) -> &[RevisionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, timestamp: &str) -> Option<&RevisionEntry> {
        self.entries.iter().find(|entry| entry.timestamp == timestamp)
    }

    /// Prepends an entry unless it is a no-op. Returns whether it was kept.
    pub fn record(
        &mut self,
        now: DateTime<Utc>,
        page: &PageId,
        kind: EditKind,
        old_text: &str,
        new_text: &str,
    ) -> bool {
        if old_text == new_text || old_text == EMPTY_LINE_PLACEHOLDER {
            return false;
        }

        let timestamp = self.next_timestamp(now);
        self.entries.insert(
            0,
            RevisionEntry {
                timestamp,
                page: page.as_str().to_string(),
                kind,
                old_text: old_text.to_string(),
                new_text: new_text.to_string(),
                author: EDIT_AUTHOR.to_string(),
            },
        );
        if self.entries.len() > MAX_ENTRIES {
            self.entries.truncate(MAX_ENTRIES);
            tracing::debug!(max = MAX_ENTRIES, "revision log trimmed");
        }
        true
    }

    /// Keeps timestamps unique: a clock that has not moved past the newest
    /// entry is bumped by one millisecond.
    fn next_timestamp(&self, now: DateTime<Utc>) -> String {
        let newest = self
            .entries
            .first()
            .and_then(|entry| DateTime::parse_from_rfc3339(&entry.timestamp).ok())
            .map(|instant| instant.with_timezone(&Utc));
        let now = now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now);
        let instant = match newest {
            Some(newest) if now <= newest => newest + TimeDelta::milliseconds(1),
            _ => now,
        };
        instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn remove(&mut self, timestamp: &str) -> Option<RevisionEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.timestamp == timestamp)?;
        Some(self.entries.remove(index))
    }
}

/// Read-modify-write append of one entry. Returns false when the no-op
/// filter dropped it.
pub fn track_edit(
    storage: &mut dyn Storage,
    clock: &dyn Clock,
    page: &PageId,
    kind: EditKind,
    old_text: &str,
    new_text: &str,
) -> Result<bool, StorageError> {
    let mut log = RevisionLog::load(storage);
    if !log.record(clock.now(), page, kind, old_text, new_text) {
        return Ok(false);
    }
    log.store(storage)?;
    tracing::debug!(page = %page, kind = kind.label(), "edit tracked");
    Ok(true)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reversal {
    /// The saved body was rewritten; the page must be reloaded.
    Reverted,
    Declined,
}

/// Puts a TEXT edit's old value back into the saved page body. All or
/// nothing: on any failure neither the body nor the log changes.
pub fn reverse_edit<F>(
    storage: &mut dyn Storage,
    timestamp: &str,
    confirm: F,
) -> Result<Reversal, EditorError>
where
    F: FnOnce(&str) -> bool,
{
    let mut log = RevisionLog::load(storage);
    let entry = log.find(timestamp).cloned().ok_or(EditorError::EntryNotFound)?;

    if entry.kind.is_structural() {
        return Err(EditorError::StructuralEdit);
    }
    if !confirm(REVERSE_PROMPT) {
        return Ok(Reversal::Declined);
    }

    let page = PageId::new(entry.page.clone());
    let Some(body) = PersistedPages::get(storage, &page) else {
        return Err(EditorError::NoSavedBody { page: entry.page });
    };
    if entry.new_text.is_empty() || !body.contains(&entry.new_text) {
        return Err(EditorError::TextNotFound);
    }

    let reverted = body.replacen(&entry.new_text, &entry.old_text, 1);
    PersistedPages::put(storage, &page, &reverted)?;
    log.remove(timestamp);
    log.store(storage)?;
    tracing::info!(page = %page, timestamp, "text edit reversed");
    Ok(Reversal::Reverted)
}

/// Drops every saved page body and the whole history. Returns false when
/// the user declined.
pub fn discard_all<F>(storage: &mut dyn Storage, confirm: F) -> Result<bool, EditorError>
where
    F: FnOnce(&str) -> bool,
{
    if !confirm(DISCARD_PROMPT) {
        return Ok(false);
    }
    let pages = PersistedPages::discard_all(storage)?;
    storage.remove(REVISION_LOG_KEY)?;
    tracing::info!(pages, "all local edits discarded");
    Ok(true)
}

#[cfg(test)]
#[path = "revision_tests.rs"]
mod revision_tests;
