//! Data directory layout and file helpers
//!
//! ```text
//! <root>/
//!   .rota.toml                  # optional configuration
//!   .rota/
//!     ledger.json               # queues, members, templates, instances, requests
//!     ledger.lock               # fs2 lock guarding ledger.json
//!     notifications.jsonl       # default notification sink
//!     archive/
//!       audit.jsonl             # audit entries trimmed from instances
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;
use crate::lock;

/// Name of the data directory under the root
pub const DATA_DIR: &str = ".rota";

/// Name of the configuration file under the root
pub const CONFIG_FILE: &str = ".rota.toml";

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.data_dir().join("ledger.json")
    }

    pub fn ledger_lock(&self) -> PathBuf {
        self.data_dir().join("ledger.lock")
    }

    pub fn notifications_file(&self) -> PathBuf {
        self.data_dir().join("notifications.jsonl")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir().join("archive")
    }

    pub fn audit_archive_file(&self) -> PathBuf {
        self.archive_dir().join("audit.jsonl")
    }

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir())?;
        fs::create_dir_all(self.archive_dir())?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.data_dir().is_dir()
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Pretty JSON, written atomically
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// `None` when the file does not exist yet
    pub fn read_json_opt<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        self.read_json(path).map(Some)
    }

    /// Append one record as a line. Not atomic across processes on its own.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", json)?;
        file.flush()?;
        Ok(())
    }

    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Record {
        id: u32,
        message: String,
    }

    #[test]
    fn layout_paths() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path());

        assert_eq!(storage.data_dir(), temp.path().join(".rota"));
        assert_eq!(storage.ledger_file(), temp.path().join(".rota/ledger.json"));
        assert_eq!(storage.ledger_lock(), temp.path().join(".rota/ledger.lock"));
        assert_eq!(storage.config_file(), temp.path().join(".rota.toml"));
        assert!(!storage.is_initialized());

        storage.init().unwrap();
        assert!(storage.is_initialized());
        assert!(storage.archive_dir().is_dir());
    }

    #[test]
    fn json_round_trip_and_missing_file() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path());
        let path = storage.data_dir().join("record.json");

        assert!(storage.read_json_opt::<Record>(&path).unwrap().is_none());
        let record = Record {
            id: 7,
            message: "hello".to_string(),
        };
        storage.write_json(&path, &record).unwrap();
        assert_eq!(storage.read_json_opt::<Record>(&path).unwrap(), Some(record));
    }

    #[test]
    fn jsonl_appends_in_order() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path());
        let path = storage.notifications_file();

        for (id, message) in [(1, "first"), (2, "second"), (3, "third")] {
            storage
                .append_jsonl(
                    &path,
                    &Record {
                        id,
                        message: message.to_string(),
                    },
                )
                .unwrap();
        }

        let records: Vec<Record> = storage.read_jsonl(&path).unwrap();
        let ids: Vec<u32> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
