//! # promo-db
//!
//! Durable, indexed ledgers for the promo service.
//!
//! ## Layout
//!
//! Two independent JSON files live in the data directory:
//! - `activations.json`: permanent activation records
//! - `temporary_items.json`: temporary grant records
//!
//! Each ledger keeps its canonical record list plus two derived indices
//! (by player, by lowercased code name) behind one mutex. Writes go to a
//! `.temp` sibling that is then renamed over the durable file, so a crash
//! never leaves a half-written ledger behind. A file that fails to parse
//! is copied to `<file>.backup.<yyyyMMddHHmmss>` and replaced by an empty
//! ledger. A file that cannot be read, or cannot be backed up, is never
//! overwritten: the ledger runs in memory until a later save manages to
//! preserve the old copy first. Loading never fails.

pub mod activations;
pub mod grants;
pub mod index;
pub mod ledger;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use promo_types::Clock;

pub use activations::{ActivationLedger, RecordResult};
pub use grants::TemporaryGrantLedger;
pub use store::LoadSource;

/// File name of the activation ledger.
pub const ACTIVATIONS_FILE: &str = "activations.json";

/// File name of the temporary grant ledger.
pub const GRANTS_FILE: &str = "temporary_items.json";

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt ledger {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl DbError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Both ledgers of one data directory.
pub struct Ledgers {
    pub activations: Arc<ActivationLedger>,
    pub grants: Arc<TemporaryGrantLedger>,
}

/// Open (or create) both ledgers inside `data_dir`.
pub fn open(data_dir: &Path, clock: Arc<dyn Clock>) -> Ledgers {
    Ledgers {
        activations: Arc::new(ActivationLedger::open(
            data_dir.join(ACTIVATIONS_FILE),
            clock.clone(),
        )),
        grants: Arc::new(TemporaryGrantLedger::open(data_dir.join(GRANTS_FILE), clock)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promo_types::SystemClock;

    #[test]
    fn test_open_creates_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledgers = open(dir.path(), Arc::new(SystemClock));
        assert!(dir.path().join(ACTIVATIONS_FILE).exists());
        assert!(dir.path().join(GRANTS_FILE).exists());
        assert_eq!(ledgers.activations.len(), 0);
        assert_eq!(ledgers.grants.len(), 0);
    }
}
