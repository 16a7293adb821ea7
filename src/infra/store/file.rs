//! File-backed work store.
//!
//! Snapshots are kept in memory and mirrored to a JSON-lines file that is
//! rewritten on every change and reloaded on open, so a new process can
//! resume what a previous one persisted.

use std::collections::BTreeMap;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::core::{SchedulerError, WorkSnapshot, WorkStore};

/// File-backed store using JSON lines for durability.
#[derive(Debug)]
pub struct FileWorkStore {
    path: PathBuf,
    stream: String,
    snapshots: BTreeMap<String, WorkSnapshot>,
}

impl FileWorkStore {
    /// Open (or create) the store `<path>/<stream>.jsonl`.
    ///
    /// # Errors
    ///
    /// `Store` when the directory cannot be created or the file is unreadable.
    pub fn new(path: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let stream = stream.into();
        create_dir_all(&path).map_err(|e| SchedulerError::Store(e.to_string()))?;
        let mut store = Self {
            path,
            stream,
            snapshots: BTreeMap::new(),
        };
        store.load_from_disk()?;
        Ok(store)
    }

    /// Location of the backing file.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
    }

    fn load_from_disk(&mut self) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&file_path)
            .map_err(|e| SchedulerError::Store(e.to_string()))?;
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let line = line.map_err(|e| SchedulerError::Store(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let snapshot: WorkSnapshot =
                serde_json::from_str(&line).map_err(|e| SchedulerError::Store(e.to_string()))?;
            self.snapshots.insert(snapshot.id.clone(), snapshot);
        }
        tracing::debug!(
            file = %file_path.display(),
            count = self.snapshots.len(),
            "loaded persisted work"
        );
        Ok(())
    }

    fn rewrite_disk(&self) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)
            .map_err(|e| SchedulerError::Store(e.to_string()))?;
        for snapshot in self.snapshots.values() {
            let line =
                serde_json::to_string(snapshot).map_err(|e| SchedulerError::Store(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| SchedulerError::Store(e.to_string()))?;
        }
        file.flush().map_err(|e| SchedulerError::Store(e.to_string()))
    }
}

impl WorkStore for FileWorkStore {
    fn save(&mut self, snapshot: WorkSnapshot) -> Result<(), SchedulerError> {
        self.snapshots.insert(snapshot.id.clone(), snapshot);
        self.rewrite_disk()
    }

    fn load(&self, id: &str) -> Result<Option<WorkSnapshot>, SchedulerError> {
        Ok(self.snapshots.get(id).cloned())
    }

    fn remove(&mut self, id: &str) -> Result<bool, SchedulerError> {
        let existed = self.snapshots.remove(id).is_some();
        if existed {
            self.rewrite_disk()?;
        }
        Ok(existed)
    }

    fn list_ids(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.snapshots.keys().cloned().collect())
    }
}
