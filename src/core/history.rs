//! Bounded history of condensed prior-session records.
//!
//! The store keeps at most [`MAX_HISTORY_ENTRIES`] records, evicting the
//! oldest first. Persistence is injected through [`HistoryPersistence`]: the
//! store loads once when opened and saves after every mutation.

use crate::core::sample::Band;
use crate::core::summary::Summary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Maximum number of sessions retained.
pub const MAX_HISTORY_ENTRIES: usize = 10;

/// Condensed record of one analyzed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    /// Dominant band of the session
    pub dominant_band: Band,
    /// Mean tremor score as reported in the summary
    pub mean_score: f64,
    /// Time the session was recorded into history (ms)
    pub timestamp: i64,
    /// End of the analyzed session as reported in its metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_end: Option<String>,
}

impl SessionHistoryEntry {
    pub fn new(dominant_band: Band, mean_score: f64, timestamp: i64) -> Self {
        Self {
            dominant_band,
            mean_score,
            timestamp,
            session_end: None,
        }
    }

    /// Condense a summary into a history record.
    pub fn from_summary(summary: &Summary, timestamp: i64) -> Self {
        Self {
            dominant_band: summary.frequency_profile.dominant_band,
            mean_score: summary.intensity_profile.tremor_score.mean,
            timestamp,
            session_end: Some(summary.metadata.timestamp.clone()),
        }
    }

    /// Whether this record was condensed from `summary`.
    pub fn describes(&self, summary: &Summary) -> bool {
        self.session_end.as_deref() == Some(summary.metadata.timestamp.as_str())
            && self.dominant_band == summary.frequency_profile.dominant_band
            && self.mean_score == summary.intensity_profile.tremor_score.mean
    }
}

/// History persistence errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Storage boundary for the session history.
pub trait HistoryPersistence: Send {
    /// Load all persisted entries in chronological order.
    fn load(&self) -> Result<Vec<SessionHistoryEntry>, HistoryError>;

    /// Replace the persisted entries.
    fn save(&self, entries: &[SessionHistoryEntry]) -> Result<(), HistoryError>;
}

/// History persisted as a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl HistoryPersistence for JsonFileHistory {
    fn load(&self) -> Result<Vec<SessionHistoryEntry>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes a sibling temp file and renames it over the history, so an
    /// interrupted save leaves the previous list intact.
    fn save(&self, entries: &[SessionHistoryEntry]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let staging = self.staging_path();
        std::fs::write(&staging, json)?;
        if let Err(e) = std::fs::rename(&staging, &self.path) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Process-local persistence. Clones share the same backing list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    entries: Arc<Mutex<Vec<SessionHistoryEntry>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing entries.
    pub fn with_entries(entries: Vec<SessionHistoryEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Entries as last saved.
    pub fn saved(&self) -> Vec<SessionHistoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl HistoryPersistence for InMemoryHistory {
    fn load(&self) -> Result<Vec<SessionHistoryEntry>, HistoryError> {
        Ok(self.saved())
    }

    fn save(&self, entries: &[SessionHistoryEntry]) -> Result<(), HistoryError> {
        let mut guard = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = entries.to_vec();
        Ok(())
    }
}

/// Bounded FIFO list of prior-session records.
pub struct SessionHistoryStore {
    entries: Vec<SessionHistoryEntry>,
    persistence: Box<dyn HistoryPersistence>,
}

impl SessionHistoryStore {
    /// Load the history through `persistence`, keeping the newest entries.
    pub fn open(persistence: impl HistoryPersistence + 'static) -> Result<Self, HistoryError> {
        let mut entries = persistence.load()?;
        if entries.len() > MAX_HISTORY_ENTRIES {
            let excess = entries.len() - MAX_HISTORY_ENTRIES;
            entries.drain(..excess);
        }
        tracing::debug!(entries = entries.len(), "session history loaded");
        Ok(Self {
            entries,
            persistence: Box::new(persistence),
        })
    }

    /// Open a store backed by a JSON file.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        Self::open(JsonFileHistory::new(path))
    }

    /// An empty, non-durable store.
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            persistence: Box::new(InMemoryHistory::new()),
        }
    }

    /// Append a record, evicting the oldest beyond the bound, and persist.
    ///
    /// On a save failure the in-memory list is left as it was.
    pub fn append(&mut self, entry: SessionHistoryEntry) -> Result<(), HistoryError> {
        let mut next = self.entries.clone();
        next.push(entry);
        if next.len() > MAX_HISTORY_ENTRIES {
            let excess = next.len() - MAX_HISTORY_ENTRIES;
            next.drain(..excess);
            tracing::debug!(evicted = excess, "evicted oldest history entries");
        }
        self.persistence.save(&next)?;
        self.entries = next;
        Ok(())
    }

    /// The last `k` entries (fewer if the store is shorter), oldest first.
    pub fn recent_suffix(&self, k: usize) -> &[SessionHistoryEntry] {
        let start = self.entries.len().saturating_sub(k);
        &self.entries[start..]
    }

    pub fn entries(&self) -> &[SessionHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `summary` has already been recorded.
    pub fn contains_summary(&self, summary: &Summary) -> bool {
        self.entries.iter().any(|entry| entry.describes(summary))
    }

    /// Remove every entry and persist the empty list.
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.persistence.save(&[])?;
        self.entries.clear();
        Ok(())
    }
}

impl std::fmt::Debug for SessionHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHistoryStore")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
