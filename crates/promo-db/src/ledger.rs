//! Shared ledger core: one lock over the indexed log and its dirty flag,
//! plus the persist / reload / autosave contract both ledgers follow.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use promo_types::Clock;

use crate::index::{IndexedLog, LedgerRecord};
use crate::store::{JsonStore, LoadSource};
use crate::Result;

struct LedgerState<T> {
    log: IndexedLog<T>,
    dirty: bool,
    /// The durable file could not be loaded and must be backed up before
    /// anything is written over it.
    guarded: bool,
}

/// Generic durable ledger.
pub struct Ledger<T> {
    name: &'static str,
    store: JsonStore,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState<T>>,
}

impl<T> Ledger<T>
where
    T: LedgerRecord + Serialize + DeserializeOwned,
{
    /// Load `path` (creating it if absent) and build the indices.
    pub fn open(name: &'static str, path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let ledger = Self {
            name,
            store: JsonStore::new(path),
            clock,
            state: Mutex::new(LedgerState {
                log: IndexedLog::default(),
                dirty: false,
                guarded: false,
            }),
        };
        {
            let mut state = ledger.lock();
            ledger.load_locked(&mut state);
        }
        ledger
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run a read-only query under the lock.
    pub fn read<R>(&self, query: impl FnOnce(&IndexedLog<T>) -> R) -> R {
        query(&self.lock().log)
    }

    /// Run a mutation under the lock. The closure returns its result and
    /// whether it changed anything; a change marks the ledger dirty.
    pub fn write<R>(&self, mutation: impl FnOnce(&mut IndexedLog<T>) -> (R, bool)) -> R {
        let mut state = self.lock();
        let (result, changed) = mutation(&mut state.log);
        if changed {
            state.dirty = true;
        }
        result
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Atomically write the full record set and clear the dirty flag.
    ///
    /// On failure the in-memory state stays authoritative and dirty.
    pub fn persist(&self) -> Result<()> {
        let mut state = self.lock();
        self.persist_locked(&mut state)
    }

    /// Persist only when there are unsaved changes. Returns whether a
    /// write happened.
    pub fn persist_if_dirty(&self) -> Result<bool> {
        let mut state = self.lock();
        if !state.dirty {
            return Ok(false);
        }
        self.persist_locked(&mut state)?;
        Ok(true)
    }

    /// Flush pending changes, then re-read the durable file and rebuild
    /// the indices from scratch.
    ///
    /// If the flush fails nothing is re-read: the in-memory records stay
    /// authoritative and dirty, and the flush error is returned.
    pub fn reload(&self) -> Result<LoadSource> {
        let mut state = self.lock();
        if state.dirty {
            self.persist_locked(&mut state)?;
        }
        Ok(self.load_locked(&mut state))
    }

    fn load_locked(&self, state: &mut LedgerState<T>) -> LoadSource {
        let loaded = self.store.load::<T>(self.clock.now());
        let source = loaded.source;
        state.log.replace_all(loaded.records);
        state.dirty = false;
        state.guarded = matches!(source, LoadSource::Unreadable { .. });

        match &source {
            LoadSource::File => {
                info!(ledger = self.name, records = state.log.len(), path = %self.path().display(), "ledger loaded");
            }
            LoadSource::Missing => {
                info!(ledger = self.name, path = %self.path().display(), "creating new ledger");
                let _ = self.persist_locked(state);
            }
            LoadSource::Recovered { backup } => {
                warn!(
                    ledger = self.name,
                    backup = %backup.display(),
                    "ledger recovered from corrupt file, continuing empty"
                );
                let _ = self.persist_locked(state);
            }
            LoadSource::Unreadable { reason } => {
                error!(
                    ledger = self.name,
                    path = %self.path().display(),
                    %reason,
                    "ledger file unreadable, running in memory and leaving it untouched"
                );
            }
        }
        source
    }

    fn persist_locked(&self, state: &mut LedgerState<T>) -> Result<()> {
        if state.guarded {
            self.preserve_guarded()?;
            state.guarded = false;
        }
        match self.store.persist(state.log.records()) {
            Ok(()) => {
                state.dirty = false;
                debug!(ledger = self.name, records = state.log.len(), "ledger persisted");
                Ok(())
            }
            Err(e) => {
                error!(ledger = self.name, error = %e, "failed to persist ledger");
                Err(e)
            }
        }
    }

    /// Back up the durable file that failed to load before it is replaced.
    fn preserve_guarded(&self) -> Result<()> {
        match self.path().try_exists() {
            Ok(false) => Ok(()),
            Ok(true) => match self.store.backup(self.clock.now()) {
                Ok(backup) => {
                    warn!(ledger = self.name, backup = %backup.display(), "unreadable ledger preserved before save");
                    Ok(())
                }
                Err(e) => {
                    error!(ledger = self.name, error = %e, "refusing to overwrite unreadable ledger");
                    Err(e)
                }
            },
            Err(e) => Err(crate::DbError::io(self.path(), e)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState<T>> {
        // Every mutation leaves the log consistent before it can panic out,
        // so a poisoned state is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use promo_types::{ActivationRecord, SystemClock};

    fn open(dir: &Path) -> Ledger<ActivationRecord> {
        Ledger::open("test", dir.join("l.json"), Arc::new(SystemClock))
    }

    fn record(player: u64) -> ActivationRecord {
        ActivationRecord {
            player_id: player,
            code_name: "welcome".to_string(),
            activated_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_marks_dirty_only_on_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = open(dir.path());
        assert!(!ledger.is_dirty());

        ledger.write(|_| ((), false));
        assert!(!ledger.is_dirty());

        ledger.write(|log| (log.insert(record(1)), true));
        assert!(ledger.is_dirty());

        assert!(ledger.persist_if_dirty().expect("persist"));
        assert!(!ledger.is_dirty());
        assert!(!ledger.persist_if_dirty().expect("persist"));
    }

    #[test]
    fn test_reload_flushes_pending_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = open(dir.path());
        ledger.write(|log| (log.insert(record(1)), true));

        assert_eq!(ledger.reload().expect("reload"), LoadSource::File);
        assert_eq!(ledger.read(|log| log.len()), 1);
        assert!(!ledger.is_dirty());
    }

    #[test]
    fn test_persist_failure_keeps_dirty() {
        let dir = tempfile::tempdir().expect("tempdir");
        // The durable path is an existing directory, so the rename fails.
        let target = dir.path().join("blocked");
        std::fs::create_dir_all(target.join("inner")).expect("mkdir");
        let ledger: Ledger<ActivationRecord> =
            Ledger::open("test", &target, Arc::new(SystemClock));

        ledger.write(|log| (log.insert(record(1)), true));
        assert!(ledger.persist().is_err());
        assert!(ledger.is_dirty());
        assert_eq!(ledger.read(|log| log.len()), 1);
    }

    #[test]
    fn test_reload_keeps_unsaved_records_when_flush_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("blocked");
        std::fs::create_dir_all(target.join("inner")).expect("mkdir");
        let ledger: Ledger<ActivationRecord> =
            Ledger::open("test", &target, Arc::new(SystemClock));

        ledger.write(|log| (log.insert(record(1)), true));
        assert!(ledger.reload().is_err());
        assert!(ledger.is_dirty());
        assert_eq!(ledger.read(|log| log.len()), 1);
    }

    #[test]
    fn test_corrupt_file_that_cannot_be_backed_up_is_never_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        // The timestamped backup name of this file exceeds NAME_MAX.
        let path = dir.path().join(format!("{}.json", "l".repeat(235)));
        let original = format!(
            "[{}, {{\"steam_id\": ",
            serde_json::to_string(&record(7)).expect("serialize")
        );
        std::fs::write(&path, &original).expect("write");

        let ledger: Ledger<ActivationRecord> = Ledger::open("test", &path, Arc::new(SystemClock));
        assert_eq!(ledger.read(|log| log.len()), 0);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), original);

        ledger.write(|log| (log.insert(record(1)), true));
        assert!(ledger.persist().is_err());
        assert!(ledger.persist_if_dirty().is_err());
        assert!(ledger.reload().is_err());
        assert!(ledger.is_dirty());
        assert_eq!(ledger.read(|log| log.len()), 1);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), original);
    }
}
