//! Durable cache of the last selection round.
//!
//! The round is split across independent key-value entries (candidates,
//! votes, winner, request context) so one unreadable entry does not take
//! the others down with it. Loading never fails: anything unreadable is
//! logged as a corrupt persisted round and replaced by a safe fallback.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aggregator::select_winner;
use crate::error::PersistenceError;
use crate::model::{Candidate, GenerateRequest, SelectionRound, VoteMap};
use crate::traits::KeyValueStore;

pub const CANDIDATES_KEY: &str = "round.candidates";
pub const VOTES_KEY: &str = "round.votes";
pub const WINNER_KEY: &str = "round.winner_id";
pub const CONTEXT_KEY: &str = "round.request_context";
pub const PURGED_KEY: &str = "purged_ids";

/// Reads and writes the single "last round" through a `KeyValueStore`.
#[derive(Clone)]
pub struct RoundPersistence {
    store: Arc<dyn KeyValueStore>,
}

impl RoundPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// In-memory persistence, lost when dropped.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    /// Write every entry of `round`, replacing the previous round.
    pub fn save(&self, round: &SelectionRound) -> Result<(), PersistenceError> {
        self.put(CANDIDATES_KEY, &round.candidates)?;
        self.put(VOTES_KEY, &round.votes)?;
        self.put(WINNER_KEY, &round.winner_id)?;
        self.put(CONTEXT_KEY, &round.request_context)?;
        tracing::debug!(
            "persisted round with {} candidate(s)",
            round.candidates.len()
        );
        Ok(())
    }

    /// Load the last round, or `None` when there is nothing usable.
    pub fn load(&self) -> Option<SelectionRound> {
        let candidates: Vec<Candidate> = match self.read(CANDIDATES_KEY) {
            Ok(Some(candidates)) => candidates,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("{err}; starting without a round");
                return None;
            }
        };

        let votes: VoteMap = self.read_or_default(VOTES_KEY);
        let request_context: GenerateRequest = self.read_or_default(CONTEXT_KEY);

        let stored_winner: Option<String> = self.read_or_default(WINNER_KEY);
        let winner_id = match stored_winner {
            Some(id) if votes.get(&id).is_some_and(|v| !v.is_empty()) => Some(id),
            Some(id) => {
                tracing::warn!("stored winner {id} has no votes; recomputing");
                select_winner(&votes)
            }
            None => select_winner(&votes),
        };

        Some(SelectionRound {
            candidates,
            votes,
            winner_id,
            request_context,
        })
    }

    /// Ids purged locally in any earlier session.
    pub fn purged_ids(&self) -> BTreeSet<String> {
        self.read_or_default(PURGED_KEY)
    }

    /// Remember a purge so later sessions keep hiding the question.
    pub fn record_purged(&self, id: &str) -> Result<(), PersistenceError> {
        let mut ids = self.purged_ids();
        if ids.insert(id.to_string()) {
            self.put(PURGED_KEY, &ids)?;
        }
        Ok(())
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_string(value)
            .with_context(|| format!("failed to encode '{key}'"))?;
        self.store.set(key, &encoded)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PersistenceError::CorruptPersistedRound {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn read_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.read(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                tracing::warn!("{err}; using default");
                T::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// Every `set` rewrites the whole file through a temp file and a rename, so
/// a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> anyhow::Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON object of strings", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        // An unreadable file is replaced rather than blocking every write.
        let mut entries = self.read_all().unwrap_or_else(|e| {
            tracing::warn!("discarding unreadable state file: {e:#}");
            HashMap::new()
        });
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&temp_path, content)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
