//! JSON file persistence with atomic replace and corrupt-file backup.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{DbError, Result};

/// Suffix of the scratch file written before the atomic rename.
const TEMP_SUFFIX: &str = ".temp";

/// Infix of corrupt-file backups: `<file>.backup.<yyyyMMddHHmmss>`.
const BACKUP_INFIX: &str = ".backup.";

/// Where the records of a load came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// No durable file existed yet.
    Missing,
    /// Parsed from the durable file.
    File,
    /// The durable file did not parse; it was preserved under `backup` and
    /// an empty ledger substituted.
    Recovered { backup: PathBuf },
    /// The durable file could not be read, or did not parse and could not
    /// be backed up. It is left untouched and the ledger starts empty.
    Unreadable { reason: String },
}

/// Records plus provenance.
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub source: LoadSource,
}

/// One JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records. Never fails: a missing file yields an empty set,
    /// a corrupt one is backed up and yields an empty set, and one that
    /// cannot be read at all yields an empty set without being touched.
    pub fn load<T: DeserializeOwned>(&self, now: DateTime<Utc>) -> Loaded<T> {
        let source = match self.path.try_exists() {
            Ok(false) => LoadSource::Missing,
            Ok(true) => match self.read::<T>() {
                Ok(records) => {
                    return Loaded {
                        records,
                        source: LoadSource::File,
                    }
                }
                Err(DbError::Corrupt { reason, .. }) => {
                    tracing::warn!(path = %self.path.display(), %reason, "ledger file corrupt, starting empty");
                    match self.backup(now) {
                        Ok(backup) => {
                            tracing::warn!(backup = %backup.display(), "corrupt ledger preserved");
                            LoadSource::Recovered { backup }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to back up corrupt ledger");
                            LoadSource::Unreadable {
                                reason: e.to_string(),
                            }
                        }
                    }
                }
                Err(e) => LoadSource::Unreadable {
                    reason: e.to_string(),
                },
            },
            Err(e) => LoadSource::Unreadable {
                reason: DbError::io(&self.path, e).to_string(),
            },
        };
        Loaded {
            records: Vec::new(),
            source,
        }
    }

    fn read<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let content = fs::read_to_string(&self.path).map_err(|e| DbError::io(&self.path, e))?;
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Vec::new());
        }
        serde_json::from_str(trimmed).map_err(|e| DbError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Write all records: serialize, write `<file>.temp`, fsync, rename over
    /// the durable file. The previous durable copy survives any failure.
    pub fn persist<T: Serialize>(&self, records: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DbError::io(parent, e))?;
            }
        }

        let json = serde_json::to_vec_pretty(records)?;
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp).map_err(|e| DbError::io(&temp, e))?;
            file.write_all(&json).map_err(|e| DbError::io(&temp, e))?;
            file.sync_all().map_err(|e| DbError::io(&temp, e))?;
        }
        fs::rename(&temp, &self.path).map_err(|e| DbError::io(&self.path, e))?;
        Ok(())
    }

    /// Copy the durable file to a timestamped backup next to it.
    pub fn backup(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let stamp = now.format("%Y%m%d%H%M%S").to_string();
        let base = format!("{}{BACKUP_INFIX}{stamp}", self.path.display());
        let mut target = PathBuf::from(&base);
        let mut attempt = 1;
        while target.exists() {
            target = PathBuf::from(format!("{base}-{attempt}"));
            attempt += 1;
        }
        fs::copy(&self.path, &target).map_err(|e| DbError::io(&target, e))?;
        Ok(target)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }
}
