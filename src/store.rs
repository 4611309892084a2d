//! Persistence behind the services
//!
//! A [`Store`] hands out the [`Ledger`] in two ways: a snapshot for reads, and
//! an exclusive transaction for writes. A transaction either commits every
//! change the closure made or none of them, which is what makes
//! create-if-absent generation and compare-and-set claims safe under
//! concurrent callers.

use std::sync::Mutex;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::lock::{FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::storage::Storage;

pub trait Store: Send + Sync {
    /// Point-in-time copy of the ledger
    fn read(&self) -> Result<Ledger>;

    /// Run `f` with exclusive access. Changes are kept only when `f` returns `Ok`.
    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>;
}

impl<S: Store + ?Sized> Store for &S {
    fn read(&self) -> Result<Ledger> {
        (**self).read()
    }

    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>,
    {
        (**self).transact(f)
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn read(&self) -> Result<Ledger> {
        let guard = self.ledger.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard.clone())
    }

    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>,
    {
        let mut guard = self.ledger.lock().unwrap_or_else(|p| p.into_inner());
        let mut working = guard.clone();
        let out = f(&mut working)?;
        *guard = working;
        Ok(out)
    }
}

// =============================================================================
// File-backed
// =============================================================================

/// Ledger persisted as `.rota/ledger.json` under an fs2 lock
#[derive(Debug, Clone)]
pub struct FileStore {
    storage: Storage,
    lock_timeout_ms: u64,
}

impl FileStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn load(&self) -> Result<Ledger> {
        Ok(self
            .storage
            .read_json_opt(&self.storage.ledger_file())?
            .unwrap_or_default())
    }
}

impl Store for FileStore {
    fn read(&self) -> Result<Ledger> {
        self.load()
    }

    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>,
    {
        let _lock = FileLock::acquire(self.storage.ledger_lock(), self.lock_timeout_ms)?;
        let mut ledger = self.load()?;
        let out = f(&mut ledger)?;
        self.storage.write_json(&self.storage.ledger_file(), &ledger)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::queue::RotationQueue;
    use tempfile::TempDir;

    fn exercise(store: &impl Store) {
        store
            .transact(|ledger| ledger.add_queue(RotationQueue::new("lab")).map(|_| ()))
            .unwrap();

        let failed: Result<()> = store.transact(|ledger| {
            ledger.add_queue(RotationQueue::new("other"))?;
            Err(Error::Conflict("abort".to_string()))
        });
        assert!(failed.is_err());

        let snapshot = store.read().unwrap();
        let names: Vec<&str> = snapshot.queues.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["lab"]);
    }

    #[test]
    fn memory_store_rolls_back_failed_transactions() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn file_store_rolls_back_failed_transactions() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(Storage::new(temp.path()));
        exercise(&store);
        assert!(store.storage().ledger_file().exists());

        let reopened = FileStore::new(Storage::new(temp.path()));
        assert_eq!(reopened.read().unwrap().queues.len(), 1);
    }

    #[test]
    fn file_store_reads_empty_ledger_before_first_write() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(Storage::new(temp.path()));
        let ledger = store.read().unwrap();
        assert!(ledger.queues.is_empty());
        assert!(ledger.instances.is_empty());
    }
}
