/// Durable per-repository session history.
///
/// Storage is a key-value store of opaque text slots:
/// - `repo_history`  : JSON array of `HistoryRecord`, most recent first
/// - `selected_model`: last model id picked by the user
///
/// The store is best-effort and non-transactional. Every mutation re-reads
/// the freshest snapshot right before writing, but two near-simultaneous
/// writers can still race; the later write wins.
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::transcript::ChatMessage;

pub const HISTORY_KEY: &str = "repo_history";
pub const MODEL_KEY: &str = "selected_model";

// ── Key-value backends ────────────────────────────────────────────────────────

/// Named text slots. `get` never fails; an unreadable slot reads as absent.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per slot under the data directory, replaced atomically on write.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.slot_path(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable store slot, treating as empty");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create data directory {}", self.dir.display()))?;
        let path = self.slot_path(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        {
            let mut f = std::fs::File::create(&tmp)
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            f.write_all(value.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store. Nothing survives the process; used by tests.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.slots().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slots().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots().remove(key);
        Ok(())
    }
}

// ── HistoryRecord ─────────────────────────────────────────────────────────────

/// Persisted snapshot of one repository's metadata and transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Repository identifier as the user typed it. Unique within the store.
    pub url: String,
    pub last_accessed: DateTime<Utc>,
    pub file_count: u64,
    #[serde(default)]
    pub transcript: Vec<ChatMessage>,
}

impl HistoryRecord {
    /// Short label for lists: drops the `https://github.com/` prefix.
    pub fn display_name(&self) -> &str {
        display_name(&self.url)
    }
}

/// `owner/name` for GitHub URLs, the input unchanged otherwise.
pub fn display_name(url: &str) -> &str {
    url.strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .unwrap_or(url)
        .trim_end_matches('/')
}

// ── HistoryStore ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HistoryStore {
    kv: Arc<dyn KeyValueStore>,
}

impl HistoryStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// All records, most recent first. Absent or unparsable data reads as
    /// empty history, never as an error.
    pub fn read_all(&self) -> Vec<HistoryRecord> {
        let Some(raw) = self.kv.get(HISTORY_KEY) else {
            return Vec::new();
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<HistoryRecord>>(&raw) {
            Ok(mut records) => {
                // Hand-edited files may carry duplicates; the first one wins.
                let mut seen = std::collections::HashSet::new();
                records.retain(|r| seen.insert(r.url.clone()));
                records
            }
            Err(e) => {
                warn!(error = %e, "history store is corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    /// Replace the whole collection.
    pub fn write_all(&self, records: &[HistoryRecord]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.kv.set(HISTORY_KEY, &json)?;
        debug!(records = records.len(), "history written");
        Ok(())
    }

    /// Insert or replace the record for `record.url`. The touched record
    /// always moves to the front.
    pub fn upsert(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.read_all();
        records.retain(|r| r.url != record.url);
        records.insert(0, record);
        self.write_all(&records)
    }

    /// Record a successful repository load. Creates the record with an empty
    /// transcript on first load; afterwards only `file_count` and
    /// `last_accessed` change. Moves the record to the front.
    pub fn record_load(&self, url: &str, file_count: u64, now: DateTime<Utc>) -> Result<HistoryRecord> {
        let record = HistoryRecord {
            url: url.to_string(),
            last_accessed: now,
            file_count,
            transcript: self.find(url).map(|r| r.transcript).unwrap_or_default(),
        };
        self.upsert(record.clone())?;
        Ok(record)
    }

    /// Write back a transcript in place. Returns false (and writes nothing)
    /// when `url` has no record yet.
    pub fn update_transcript(&self, url: &str, transcript: &[ChatMessage]) -> Result<bool> {
        let mut records = self.read_all();
        let Some(record) = records.iter_mut().find(|r| r.url == url) else {
            return Ok(false);
        };
        record.transcript = transcript.to_vec();
        self.write_all(&records)?;
        Ok(true)
    }

    pub fn find(&self, url: &str) -> Option<HistoryRecord> {
        self.read_all().into_iter().find(|r| r.url == url)
    }

    /// Drop every record.
    pub fn clear(&self) -> Result<()> {
        self.kv.remove(HISTORY_KEY)
    }
}

// ── Model preference ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ModelPreference {
    kv: Arc<dyn KeyValueStore>,
}

impl ModelPreference {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> Option<String> {
        self.kv
            .get(MODEL_KEY)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn save(&self, model: &str) -> Result<()> {
        self.kv.set(MODEL_KEY, model)
    }
}
