//! Durable session storage under `.monoco/sessions/`.

use crate::error::{SchedulerError, SchedulerResult};
use monoco_core::{Role, SessionId, SessionRecord, write_atomic};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One JSON file per session, atomic writes, cache-backed reads.
///
/// The cache is authoritative within one process: every `put` goes through
/// it, so readers never observe a state older than the last local write.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    cache: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl SessionStore {
    /// Open a store over the given sessions directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> SchedulerResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Persist a record, then update the cache.
    ///
    /// The disk write happens first: if it fails the cache keeps the prior
    /// state, which is what the scheduler's abort-on-persist-failure
    /// semantics require.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::PersistFailed`] on serialization or IO
    /// failure.
    pub async fn put(&self, record: &SessionRecord) -> SchedulerResult<()> {
        let persist = |reason: String| SchedulerError::PersistFailed {
            session_id: record.session_id,
            reason,
        };
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| persist(e.to_string()))?;
        write_atomic(&self.path_for(&record.session_id), &bytes)
            .map_err(|e| persist(e.to_string()))?;

        self.cache
            .write()
            .await
            .insert(record.session_id, record.clone());
        debug!(session_id = %record.session_id, status = %record.status, "session persisted");
        Ok(())
    }

    /// Fetch one record, reading through to disk on a cache miss.
    pub async fn get(&self, session_id: &SessionId) -> Option<SessionRecord> {
        if let Some(record) = self.cache.read().await.get(session_id) {
            return Some(record.clone());
        }
        let record = read_record(&self.path_for(session_id))?;
        self.cache
            .write()
            .await
            .insert(*session_id, record.clone());
        Some(record)
    }

    /// Load every record from disk into the cache and return them.
    ///
    /// Unreadable files are skipped with a warning rather than failing the
    /// whole load (recovery must proceed past one corrupt record).
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory itself cannot be read.
    pub async fn load_all(&self) -> SchedulerResult<Vec<SessionRecord>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Some(record) => records.push(record),
                None => warn!(path = %path.display(), "skipping unreadable session record"),
            }
        }

        let mut cache = self.cache.write().await;
        for record in &records {
            cache.insert(record.session_id, record.clone());
        }
        Ok(records)
    }

    /// All cached records in a non-terminal state.
    pub async fn list_active(&self) -> Vec<SessionRecord> {
        self.cache
            .read()
            .await
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect()
    }

    /// All cached records for one role.
    pub async fn list_by_role(&self, role: Role) -> Vec<SessionRecord> {
        self.cache
            .read()
            .await
            .values()
            .filter(|r| r.task.role == role)
            .cloned()
            .collect()
    }

    /// Snapshot of every cached record.
    pub async fn snapshot(&self) -> Vec<SessionRecord> {
        self.cache.read().await.values().cloned().collect()
    }
}

fn read_record(path: &Path) -> Option<SessionRecord> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
