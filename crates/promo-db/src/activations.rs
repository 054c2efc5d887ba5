//! Activation ledger: permanent "player redeemed code" records.
//!
//! At most one record exists per (player, code) pair, code names compared
//! case-insensitively. The duplicate check and the append happen under the
//! same lock, so concurrent redemptions of one pair cannot both succeed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use promo_types::{code_key, ActivationRecord, Clock, PlayerId};

use crate::index::IndexedLog;
use crate::ledger::Ledger;
use crate::store::LoadSource;
use crate::Result;

/// Result of a quota-aware record attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    Recorded,
    AlreadyActivated,
    QuotaReached,
    /// Empty code name.
    Invalid,
}

/// Durable, indexed store of activation records.
pub struct ActivationLedger {
    inner: Ledger<ActivationRecord>,
}

impl ActivationLedger {
    /// Open the ledger stored at `path`.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Ledger::open("activations", path, clock),
        }
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Append an activation unless the pair already exists.
    pub fn record_activation(
        &self,
        player: PlayerId,
        code: &str,
        activated_at: DateTime<Utc>,
    ) -> bool {
        self.record_activation_within(player, code, activated_at, None) == RecordResult::Recorded
    }

    /// Append an activation unless the pair exists or the code already has
    /// `max_activations` records. Both checks and the append are atomic.
    pub fn record_activation_within(
        &self,
        player: PlayerId,
        code: &str,
        activated_at: DateTime<Utc>,
        max_activations: Option<u32>,
    ) -> RecordResult {
        if code.is_empty() {
            return RecordResult::Invalid;
        }
        self.inner.write(|log| {
            if has_activated(log, player, code) {
                return (RecordResult::AlreadyActivated, false);
            }
            if let Some(max) = max_activations {
                if log.count_for_code(code) >= max as usize {
                    return (RecordResult::QuotaReached, false);
                }
            }
            log.insert(ActivationRecord {
                player_id: player,
                code_name: code.to_string(),
                activated_at,
            });
            (RecordResult::Recorded, true)
        })
    }

    pub fn has_activated(&self, player: PlayerId, code: &str) -> bool {
        !code.is_empty() && self.inner.read(|log| has_activated(log, player, code))
    }

    /// Number of activations of `code`; zero for unseen codes.
    pub fn activation_count(&self, code: &str) -> usize {
        if code.is_empty() {
            return 0;
        }
        self.inner.read(|log| log.count_for_code(code))
    }

    /// All records, or only those of `code`.
    pub fn list_activations(&self, code: Option<&str>) -> Vec<ActivationRecord> {
        self.inner.read(|log| match code {
            Some(code) => log.for_code(code).cloned().collect(),
            None => log.records().to_vec(),
        })
    }

    pub fn activations_for_player(&self, player: PlayerId) -> Vec<ActivationRecord> {
        self.inner.read(|log| log.for_player(player).cloned().collect())
    }

    /// Distinct players with at least one activation, optionally of one code.
    pub fn unique_players(&self, code: Option<&str>) -> usize {
        self.inner.read(|log| match code {
            Some(code) => log
                .for_code(code)
                .map(|r| r.player_id)
                .collect::<HashSet<_>>()
                .len(),
            None => log.player_count(),
        })
    }

    /// Distinct code names present in the ledger, lowercased.
    pub fn code_keys(&self) -> HashSet<String> {
        self.inner
            .read(|log| log.records().iter().map(|r| code_key(&r.code_name)).collect())
    }

    /// Remove every record of `code`. Returns the number removed.
    pub fn purge_code(&self, code: &str) -> usize {
        if code.is_empty() {
            return 0;
        }
        let key = code_key(code);
        let removed = self.inner.write(|log| {
            let removed = log.retain(|r| code_key(&r.code_name) != key);
            (removed, removed > 0)
        });
        if removed > 0 {
            info!(code, removed, "purged activations");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read(IndexedLog::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    pub fn persist(&self) -> Result<()> {
        self.inner.persist()
    }

    pub fn persist_if_dirty(&self) -> Result<bool> {
        self.inner.persist_if_dirty()
    }

    pub fn reload(&self) -> Result<LoadSource> {
        self.inner.reload()
    }

    /// Whether the derived indices match the record log.
    pub fn is_consistent(&self) -> bool {
        self.inner.read(IndexedLog::is_consistent)
    }
}

fn has_activated(log: &IndexedLog<ActivationRecord>, player: PlayerId, code: &str) -> bool {
    let key = code_key(code);
    log.for_player(player)
        .any(|r| code_key(&r.code_name) == key)
}
