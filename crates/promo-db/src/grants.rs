//! Temporary grant ledger.
//!
//! A grant is created when a temporary code is redeemed and carries an
//! absolute `expires_at`. The expiry sweeper polls [`TemporaryGrantLedger::due_for_revocation`]
//! and flips `is_revoked` once the host has taken the reward back.
//! Revoked grants are kept for a retention window, then purged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use promo_types::{
    code_key, saturating_add, saturating_sub, Clock, PlayerId, TemporaryGrantRecord,
};

use crate::index::IndexedLog;
use crate::ledger::Ledger;
use crate::store::LoadSource;
use crate::Result;

/// Random bytes in a grant id (rendered as 32 hex chars).
const GRANT_ID_BYTES: usize = 16;

/// Durable, indexed store of temporary grants.
pub struct TemporaryGrantLedger {
    inner: Ledger<TemporaryGrantRecord>,
}

impl TemporaryGrantLedger {
    /// Open the ledger stored at `path`.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Ledger::open("temporary_grants", path, clock),
        }
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a grant expiring `duration` from now, clamped to the latest
    /// storable instant. Returns `None` for an empty code name.
    pub fn create_grant(
        &self,
        player: PlayerId,
        code: &str,
        duration: Duration,
    ) -> Option<TemporaryGrantRecord> {
        if code.is_empty() {
            return None;
        }
        let now = self.inner.clock().now();
        let grant = self.inner.write(|log| {
            let mut id = new_grant_id();
            while log.position(|g| g.id == id).is_some() {
                id = new_grant_id();
            }
            let grant = TemporaryGrantRecord {
                id,
                player_id: player,
                code_name: code.to_string(),
                activated_at: now,
                expires_at: saturating_add(now, duration),
                is_revoked: false,
            };
            log.insert(grant.clone());
            (grant, true)
        });
        debug!(player_id = player, code, grant_id = %grant.id, expires_at = %grant.expires_at, "temporary grant created");
        Some(grant)
    }

    /// Unrevoked, unexpired grants of `player`.
    pub fn active_grants(&self, player: PlayerId) -> Vec<TemporaryGrantRecord> {
        let now = self.inner.clock().now();
        self.inner.read(|log| {
            log.for_player(player)
                .filter(|g| g.is_active_at(now))
                .cloned()
                .collect()
        })
    }

    /// Unrevoked, unexpired grants of every player.
    pub fn all_active(&self) -> Vec<TemporaryGrantRecord> {
        let now = self.inner.clock().now();
        self.inner.read(|log| {
            log.records()
                .iter()
                .filter(|g| g.is_active_at(now))
                .cloned()
                .collect()
        })
    }

    /// Every grant, revoked or not.
    pub fn all_grants(&self) -> Vec<TemporaryGrantRecord> {
        self.inner.read(|log| log.records().to_vec())
    }

    pub fn grants_for_code(&self, code: &str) -> Vec<TemporaryGrantRecord> {
        self.inner.read(|log| log.for_code(code).cloned().collect())
    }

    /// Unrevoked grants whose expiry has passed.
    pub fn due_for_revocation(&self) -> Vec<TemporaryGrantRecord> {
        let now = self.inner.clock().now();
        self.inner.read(|log| {
            log.records()
                .iter()
                .filter(|g| g.is_due_at(now))
                .cloned()
                .collect()
        })
    }

    /// Flip `is_revoked`. Idempotent; unknown ids are ignored. Returns
    /// whether the grant changed.
    pub fn mark_revoked(&self, id: &str) -> bool {
        self.inner.write(|log| {
            let Some(pos) = log.position(|g| g.id == id && !g.is_revoked) else {
                return (false, false);
            };
            let changed = log.update(pos, |g| g.is_revoked = true);
            (changed, changed)
        })
    }

    /// Remove every grant of `code`. Returns the number removed.
    pub fn purge_code(&self, code: &str) -> usize {
        if code.is_empty() {
            return 0;
        }
        let key = code_key(code);
        let removed = self.inner.write(|log| {
            let removed = log.retain(|g| code_key(&g.code_name) != key);
            (removed, removed > 0)
        });
        if removed > 0 {
            info!(code, removed, "purged temporary grants");
        }
        removed
    }

    /// Remove revoked grants that expired more than `retention_days` ago.
    pub fn purge_old_revoked(&self, retention_days: u32) -> usize {
        let retention = Duration::days(i64::from(retention_days));
        let cutoff = saturating_sub(self.inner.clock().now(), retention);
        let removed = self.inner.write(|log| {
            let removed = log.retain(|g| !(g.is_revoked && g.expires_at < cutoff));
            (removed, removed > 0)
        });
        if removed > 0 {
            info!(removed, retention_days, "purged old revoked grants");
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

fn new_grant_id() -> String {
    let bytes: [u8; GRANT_ID_BYTES] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use promo_types::{latest_instant, ManualClock};

    const ALICE: PlayerId = 76561198000000001;
    const BOB: PlayerId = 76561198000000002;

    fn setup() -> (tempfile::TempDir, Arc<ManualClock>, TemporaryGrantLedger) {
        let dir = tempfile::tempdir().expect("tempdir");
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().expect("valid date");
        let clock = Arc::new(ManualClock::new(start));
        let ledger = TemporaryGrantLedger::open(dir.path().join("temporary_items.json"), clock.clone());
        (dir, clock, ledger)
    }

    #[test]
    fn test_create_grant() {
        let (_dir, clock, ledger) = setup();
        let grant = ledger
            .create_grant(ALICE, "vip1day", Duration::hours(24))
            .expect("grant");
        assert_eq!(grant.id.len(), GRANT_ID_BYTES * 2);
        assert_eq!(grant.expires_at, clock.now() + Duration::hours(24));
        assert!(!grant.is_revoked);
        assert!(ledger.create_grant(ALICE, "", Duration::hours(1)).is_none());
        assert_eq!(ledger.active_grants(ALICE), vec![grant]);
    }

    #[test]
    fn test_create_grant_clamps_huge_duration() {
        let (_dir, clock, ledger) = setup();
        let grant = ledger
            .create_grant(ALICE, "forever", Duration::hours(i64::from(u32::MAX)))
            .expect("grant");
        assert_eq!(grant.expires_at, latest_instant());
        assert!(ledger.due_for_revocation().is_empty());
        assert_eq!(ledger.purge_old_revoked(u32::MAX), 0);

        ledger.persist().expect("persist");
        let reopened = TemporaryGrantLedger::open(ledger.path().to_path_buf(), clock);
        assert_eq!(reopened.all_grants(), vec![grant]);
    }

    #[test]
    fn test_due_and_revoke() {
        let (_dir, clock, ledger) = setup();
        let short = ledger
            .create_grant(ALICE, "vip1h", Duration::hours(1))
            .expect("grant");
        ledger
            .create_grant(BOB, "vip1day", Duration::hours(24))
            .expect("grant");
        assert!(ledger.due_for_revocation().is_empty());

        clock.advance(Duration::hours(1));
        let due = ledger.due_for_revocation();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, short.id);
        assert!(ledger.active_grants(ALICE).is_empty());

        assert!(ledger.mark_revoked(&short.id));
        assert!(!ledger.mark_revoked(&short.id));
        assert!(!ledger.mark_revoked("unknown"));
        assert!(ledger.due_for_revocation().is_empty());
        assert_eq!(ledger.all_active().len(), 1);
    }

    #[test]
    fn test_purge_old_revoked() {
        let (_dir, clock, ledger) = setup();
        let old = ledger
            .create_grant(ALICE, "vip1day", Duration::hours(24))
            .expect("grant");
        ledger
            .create_grant(BOB, "vip1day", Duration::hours(24))
            .expect("grant");
        clock.advance(Duration::hours(24));
        ledger.mark_revoked(&old.id);

        assert_eq!(ledger.purge_old_revoked(30), 0);
        clock.advance(Duration::days(31));
        assert_eq!(ledger.purge_old_revoked(30), 1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_purge_code() {
        let (_dir, _clock, ledger) = setup();
        ledger.create_grant(ALICE, "vip1day", Duration::hours(24));
        ledger.create_grant(ALICE, "event", Duration::hours(2));
        assert_eq!(ledger.purge_code("VIP1DAY"), 1);
        assert!(ledger.grants_for_code("vip1day").is_empty());
        assert_eq!(ledger.active_grants(ALICE).len(), 1);
    }

    #[test]
    fn test_revocation_survives_reload() {
        let (_dir, clock, ledger) = setup();
        let grant = ledger
            .create_grant(ALICE, "vip1day", Duration::hours(24))
            .expect("grant");
        clock.advance(Duration::hours(25));
        ledger.mark_revoked(&grant.id);
        ledger.persist().expect("persist");

        let reopened = TemporaryGrantLedger::open(ledger.path().to_path_buf(), clock.clone());
        let all = reopened.all_grants();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_revoked);
        assert!(reopened.due_for_revocation().is_empty());
    }
}
