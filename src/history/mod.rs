//! Run history store
//!
//! `history.json` holds one [`RunRecord`] per successful run. The store is
//! append-only: records are never rewritten once saved, and `run_id` is
//! unique for the lifetime of the file.
//!
//! Saving takes an exclusive lock on a sibling `.lock` file, re-reads the
//! document, merges the pending records and replaces the file through a
//! temp-file rename, so a crash mid-write leaves the previous document
//! intact.


use crate::error::{ConsultantError, Result};
use crate::types::RunRecord;
use fs4::fs_std::FileExt;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Accepted top-level shapes. Saved documents are always arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryDocument {
    Sequence(Vec<RunRecord>),
    Mapping(BTreeMap<String, RunRecord>),
}

pub struct HistoryStore {
    path: PathBuf,
    /// Records known to be on disk as of the last load/save
    records: Vec<RunRecord>,
    /// Appended since the last save
    pending: Vec<RunRecord>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Open and load in one step
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document from disk, discarding anything pending.
    ///
    /// A missing file is an empty store. An empty file, or one that is not a
    /// sequence or mapping of run records, fails with `CorruptState` and is
    /// left as is.
    pub fn load(&mut self) -> Result<()> {
        self.records = read_document(&self.path)?;
        self.pending.clear();
        tracing::debug!(
            path = %self.path.display(),
            records = self.records.len(),
            "History loaded"
        );
        Ok(())
    }

    /// Saved records followed by pending ones
    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter().chain(self.pending.iter())
    }

    pub fn len(&self) -> usize {
        self.records.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.records().any(|r| r.run_id == run_id)
    }

    pub fn get(&self, run_id: &str) -> Option<&RunRecord> {
        self.records().find(|r| r.run_id == run_id)
    }

    /// Most recent record by timestamp
    pub fn latest(&self) -> Option<&RunRecord> {
        self.records().max_by_key(|r| r.timestamp)
    }

    /// Queue a record for the next save. Duplicate ids are rejected.
    pub fn append(&mut self, record: RunRecord) -> Result<()> {
        if self.contains(&record.run_id) {
            return Err(ConsultantError::DuplicateRun(record.run_id));
        }
        self.pending.push(record);
        Ok(())
    }

    /// Persist pending records.
    pub fn save(&mut self) -> Result<()> {
        let _lock = HistoryLock::acquire(&self.path)?;

        // Another process may have saved since we loaded
        let mut on_disk = read_document(&self.path)?;
        if let Some(clash) = self
            .pending
            .iter()
            .find(|p| on_disk.iter().any(|r| r.run_id == p.run_id))
        {
            return Err(ConsultantError::DuplicateRun(clash.run_id.clone()));
        }

        on_disk.extend(self.pending.iter().cloned());
        let bytes = serde_json::to_vec_pretty(&on_disk)?;
        write_atomic(&self.path, &bytes)?;

        tracing::info!(
            path = %self.path.display(),
            appended = self.pending.len(),
            total = on_disk.len(),
            "History saved"
        );
        self.records = on_disk;
        self.pending.clear();
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Vec<RunRecord>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ConsultantError::CorruptState {
                path: path.to_path_buf(),
                reason: format!("unreadable: {}", e),
            })
        }
    };

    let corrupt = |reason: String| ConsultantError::CorruptState {
        path: path.to_path_buf(),
        reason,
    };

    if contents.trim().is_empty() {
        return Err(corrupt("empty document".to_string()));
    }

    let document: HistoryDocument = serde_json::from_str(&contents)
        .map_err(|e| corrupt(format!("expected a sequence or mapping of run records: {}", e)))?;

    let records = match document {
        HistoryDocument::Sequence(records) => records,
        HistoryDocument::Mapping(map) => {
            let mut records = Vec::with_capacity(map.len());
            for (key, record) in map {
                if key != record.run_id {
                    return Err(corrupt(format!(
                        "key '{}' does not match run_id '{}'",
                        key, record.run_id
                    )));
                }
                records.push(record);
            }
            records.sort_by_key(|r| r.timestamp);
            records
        }
    };

    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.run_id.as_str()) {
            return Err(corrupt(format!("duplicate run_id '{}'", record.run_id)));
        }
    }

    Ok(records)
}

/// Sibling temp file used by the atomic replace
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Write temp + fsync + rename + fsync of the directory
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    fs::rename(&tmp, path)?;
    sync_dir(parent.unwrap_or_else(|| Path::new(".")))?;
    Ok(())
}

/// Flush a directory entry so a completed rename survives power loss
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

/// Directories cannot be opened as files here; the rename is all we get
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Exclusive advisory lock held for the duration of a save
struct HistoryLock {
    file: File,
}

impl HistoryLock {
    fn acquire(history_path: &Path) -> Result<Self> {
        let path = lock_path(history_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release history lock: {}", e);
        }
    }
}
