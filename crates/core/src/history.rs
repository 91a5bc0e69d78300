//! History Persistence
//!
//! Completed walkthrough sessions are kept in a bounded, insertion-ordered list
//! stored as a single JSON blob under a fixed key. The backing store is an
//! opaque key-value contract so the core does not care whether it lives in
//! memory, on disk, or somewhere else.

use crate::session::WalkthroughSession;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Maximum number of sessions retained in history.
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("History could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("History store lock was poisoned")]
    Poisoned,
}

/// Key-value blob storage used for session history.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HistoryError>;
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), HistoryError>;
}

/// Volatile store, mostly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HistoryError> {
        let entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HistoryError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), HistoryError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash mid-write never leaves a torn blob.
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }
}

/// Bounded history of ended walkthrough sessions.
#[derive(Clone)]
pub struct SessionHistory {
    store: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
}

impl SessionHistory {
    /// Creates a history bound to `<key_prefix>history` in `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, key_prefix: &str) -> Self {
        Self {
            store,
            key: format!("{key_prefix}history"),
            capacity: HISTORY_CAPACITY,
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Loads all retained sessions in insertion order.
    ///
    /// Unreadable or undecodable history is treated as empty.
    pub fn load(&self) -> Vec<WalkthroughSession> {
        let bytes = match self.store.get(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(
                    key = %self.key,
                    error = %e,
                    "Failed to read session history; treating as empty"
                );
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(
                    key = %self.key,
                    error = %e,
                    "Failed to decode session history; treating as empty"
                );
                Vec::new()
            }
        }
    }

    pub fn save(&self, sessions: &[WalkthroughSession]) -> Result<(), HistoryError> {
        let bytes = serde_json::to_vec(sessions)?;
        self.store.put(&self.key, bytes)
    }

    /// Appends a session, evicting the oldest entries beyond capacity.
    pub fn append(&self, session: WalkthroughSession) -> Result<(), HistoryError> {
        let mut sessions = self.load();
        sessions.push(session);
        if sessions.len() > self.capacity {
            let excess = sessions.len() - self.capacity;
            let evicted: Vec<_> = sessions.drain(..excess).map(|s| s.id).collect();
            info!(?evicted, "Evicted oldest sessions from history");
        }
        self.save(&sessions)?;
        debug!(retained = sessions.len(), "Session history saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FlaggedIssue, Speaker, TranscriptSegment};
    use chrono::Utc;

    fn history() -> SessionHistory {
        SessionHistory::new(Arc::new(MemoryStore::new()), "construction_")
    }

    fn session_with(flags: &[&str], lines: &[&str]) -> WalkthroughSession {
        let mut session = WalkthroughSession::new("construction");
        for flag in flags {
            session
                .flags
                .push(FlaggedIssue::new(flag.to_string(), None, None));
        }
        for line in lines {
            session.transcript.push(TranscriptSegment {
                timestamp: Utc::now(),
                speaker: Speaker::User,
                text: line.to_string(),
            });
        }
        session.ended_at = Some(Utc::now());
        session
    }

    #[test]
    fn test_storage_key_uses_prefix() {
        assert_eq!(history().storage_key(), "construction_history");
    }

    #[test]
    fn test_round_trip_preserves_counts_and_order() {
        let history = history();
        let session = session_with(&["first", "second", "third"], &["a", "b"]);
        history.append(session.clone()).unwrap();

        let loaded = history.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], session);
        let descriptions: Vec<_> = loaded[0].flags.iter().map(|f| f.description.as_str()).collect();
        assert_eq!(descriptions, ["first", "second", "third"]);
        assert_eq!(loaded[0].transcript.len(), 2);
    }

    #[test]
    fn test_append_evicts_oldest_beyond_capacity() {
        let history = history();
        let mut ids = Vec::new();
        for _ in 0..(HISTORY_CAPACITY + 1) {
            let session = session_with(&[], &[]);
            ids.push(session.id);
            history.append(session).unwrap();
        }

        let loaded = history.load();
        assert_eq!(loaded.len(), HISTORY_CAPACITY);
        assert_eq!(loaded[0].id, ids[1]);
        assert_eq!(loaded.last().unwrap().id, ids[HISTORY_CAPACITY]);
    }

    #[test]
    fn test_corrupt_history_loads_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.put("x_history", b"not json".to_vec()).unwrap();
        let history = SessionHistory::new(store, "x_");
        assert!(history.load().is_empty());

        // A subsequent append replaces the corrupt blob.
        history.append(session_with(&["ok"], &[])).unwrap();
        assert_eq!(history.load().len(), 1);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = SessionHistory::new(Arc::new(FileStore::new(dir.path())), "construction_");
        first.append(session_with(&["exposed wiring"], &["hello"])).unwrap();

        let reopened = SessionHistory::new(Arc::new(FileStore::new(dir.path())), "construction_");
        let loaded = reopened.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].flags[0].description, "exposed wiring");
        assert!(dir.path().join("construction_history.json").exists());
    }

    #[test]
    fn test_file_store_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert!(store.get("absent").unwrap().is_none());
    }
}
