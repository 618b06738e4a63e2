//! Persisted log of pipeline results.
//!
//! The log is an ordered list of [`PipelineRecord`]s. [`JsonHistoryStore`]
//! keeps the whole list as one JSON array on disk and rewrites it on every
//! change; [`MemoryHistoryStore`] keeps it in memory only.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::PipelineRecord;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no history record at index {index} (log has {len})")]
    OutOfRange { index: usize, len: usize },
    #[error("history lock poisoned")]
    Poisoned,
}

/// Append/read/delete access to the history log.
///
/// Implementations serialize their own writes.
pub trait HistoryStore: Send + Sync {
    fn append(&self, record: PipelineRecord) -> Result<(), HistoryError>;

    /// All records, oldest first.
    fn read_all(&self) -> Result<Vec<PipelineRecord>, HistoryError>;

    /// Remove the record at `index` (0-based, oldest first) and return it.
    fn delete_at(&self, index: usize) -> Result<PipelineRecord, HistoryError>;

    fn clear(&self) -> Result<(), HistoryError>;

    /// Make sure everything written so far is durable.
    fn flush(&self) -> Result<(), HistoryError> {
        Ok(())
    }
}

/// Default history location: `<data_dir>/textlens/history.json`.
pub fn default_history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("textlens").join("history.json"))
}

/// History log backed by a single JSON file.
///
/// Every operation reads the file afresh, so several handles (or processes)
/// on the same path see each other's writes. Mutations are
/// read-modify-write under an in-process lock.
#[derive(Debug)]
pub struct JsonHistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonHistoryStore {
    /// Open the log at `path`, checking that any existing file parses.
    ///
    /// A missing file is an empty log; the file and its parent directory are
    /// created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let store = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        let records = store.load()?;
        tracing::debug!(path = %store.path.display(), records = records.len(), "opened history");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<PipelineRecord>, HistoryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                HistoryError::Corrupt {
                    path: self.path.clone(),
                    source,
                }
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(HistoryError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, records: &[PipelineRecord]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let content = serde_json::to_string_pretty(records)?;

        // Replace the log atomically via a sibling file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|source| HistoryError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl HistoryStore for JsonHistoryStore {
    fn append(&self, record: PipelineRecord) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        let mut records = self.load()?;
        records.push(record);
        self.write(&records)?;
        tracing::info!(path = %self.path.display(), records = records.len(), "appended history record");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<PipelineRecord>, HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        self.load()
    }

    fn delete_at(&self, index: usize) -> Result<PipelineRecord, HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        let mut records = self.load()?;
        if index >= records.len() {
            return Err(HistoryError::OutOfRange {
                index,
                len: records.len(),
            });
        }
        let removed = records.remove(index);
        self.write(&records)?;
        Ok(removed)
    }

    fn clear(&self) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HistoryError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// In-memory history log.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<PipelineRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, record: PipelineRecord) -> Result<(), HistoryError> {
        let mut records = self.records.lock().map_err(|_| HistoryError::Poisoned)?;
        records.push(record);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<PipelineRecord>, HistoryError> {
        let records = self.records.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(records.clone())
    }

    fn delete_at(&self, index: usize) -> Result<PipelineRecord, HistoryError> {
        let mut records = self.records.lock().map_err(|_| HistoryError::Poisoned)?;
        if index >= records.len() {
            return Err(HistoryError::OutOfRange {
                index,
                len: records.len(),
            });
        }
        Ok(records.remove(index))
    }

    fn clear(&self) -> Result<(), HistoryError> {
        let mut records = self.records.lock().map_err(|_| HistoryError::Poisoned)?;
        records.clear();
        Ok(())
    }
}
