//! Integration test: temporary grant lifecycle.
//!
//! A one-day VIP code is redeemed, listed while active, then revoked by the
//! expiry sweeper exactly once after it lapses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Duration;

use promo_core::{CommandError, ExpirySweeper, RevokeCallback, SweepPhase};
use promo_integration_tests::{vip1day, Harness};
use promo_types::{ActivationOutcome, PlayerSession, TemporaryGrantRecord};

fn vip_player(id: u64, name: &str) -> PlayerSession {
    PlayerSession::new(id, name).with_permissions(["promocode.vip"])
}

#[test]
fn vip_grant_expires_and_is_revoked_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[vip1day()]);
    let alice = vip_player(7, "Alice");
    h.host.join(alice.clone());

    let ActivationOutcome::Success(receipt) = h.service.activate(&alice, "vip1day") else {
        unreachable!("vip redemption must succeed");
    };
    let grant = receipt.grant.expect("temporary code creates a grant");
    assert_eq!(grant.expires_at - grant.activated_at, Duration::hours(24));
    assert_eq!(h.host.transcript(), vec![(7, "addrole 7 VIP".to_string())]);

    let items = h.service.temporary_items(7);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].remaining, "1d 0h 0m");

    h.clock.advance(Duration::hours(23));
    let report = h.sweeper.tick();
    assert_eq!(report.due, 0);
    assert_eq!(h.service.temporary_items(7)[0].remaining, "1h 0m");

    h.clock.advance(Duration::hours(2));
    assert!(h.service.temporary_items(7).is_empty());
    let report = h.sweeper.tick();
    assert_eq!(report.due, 1);
    assert_eq!(report.revoked, vec![grant.id.clone()]);
    assert!(report.persisted);
    assert_eq!(h.sweeper.phase(), SweepPhase::Idle);

    let transcript = h.host.transcript();
    assert_eq!(transcript.last(), Some(&(7, "removerole 7 VIP".to_string())));
    assert_eq!(h.host.notices().len(), 1);

    let report = h.sweeper.tick();
    assert_eq!(report.due, 0);
    assert_eq!(h.host.transcript().len(), 2);

    // The player keeps the activation record; the code cannot be reused.
    assert_eq!(h.service.activate(&alice, "vip1day").status(), "already_activated");
}

struct CountingRevoker {
    calls: AtomicUsize,
}

impl RevokeCallback for CountingRevoker {
    fn revoke(&self, _grant: &TemporaryGrantRecord) -> Result<(), CommandError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn sweeper_revokes_each_grant_once_across_ticks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[vip1day()]);
    for id in 1..=3 {
        assert!(h.service.activate(&vip_player(id, "p"), "vip1day").is_success());
    }

    let counter = Arc::new(CountingRevoker {
        calls: AtomicUsize::new(0),
    });
    let sweeper = ExpirySweeper::new(Arc::clone(h.service.grants()), counter.clone());

    h.clock.advance(Duration::hours(25));
    assert_eq!(sweeper.tick().revoked.len(), 3);
    for _ in 0..3 {
        assert_eq!(sweeper.tick().due, 0);
    }
    assert_eq!(counter.calls.load(Ordering::SeqCst), 3);

    let id = h.service.grants().all_grants()[0].id.clone();
    assert!(!h.service.grants().mark_revoked(&id));
    assert!(!h.service.grants().mark_revoked("no-such-grant"));
}

#[test]
fn failed_revocation_is_retried_next_tick() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[vip1day()]);
    assert!(h.service.activate(&vip_player(9, "Ivy"), "vip1day").is_success());
    h.clock.advance(Duration::days(2));

    // Without a definition there are no revoke commands to run.
    h.service.definitions().remove("vip1day");
    let report = h.sweeper.tick();
    assert_eq!(report.failed, 1);
    assert!(report.revoked.is_empty());
    assert_eq!(h.service.grants().due_for_revocation().len(), 1);

    h.service.definitions().add(&vip1day()).expect("re-add code");
    let report = h.sweeper.tick();
    assert_eq!(report.revoked.len(), 1);
    assert!(h.service.grants().due_for_revocation().is_empty());
}

#[test]
fn revoked_grants_are_purged_after_retention() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[vip1day()]);
    assert!(h.service.activate(&vip_player(1, "Jo"), "vip1day").is_success());
    h.clock.advance(Duration::hours(25));
    assert_eq!(h.sweeper.tick().revoked.len(), 1);

    assert_eq!(h.service.purge_old_revoked(30), 0);
    h.clock.advance(Duration::days(31));
    assert_eq!(h.service.purge_old_revoked(30), 1);
    assert!(h.service.grants().is_empty());
}

#[test]
fn all_temporary_items_groups_by_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[vip1day()]);
    for id in 1..=7 {
        assert!(h.service.activate(&vip_player(id, "p"), "vip1day").is_success());
        h.clock.advance(Duration::minutes(1));
    }

    let groups = h.service.all_temporary_items();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].code, "vip1day");
    assert_eq!(groups[0].count, 7);
    assert_eq!(groups[0].items.len(), 5);
    assert_eq!(groups[0].more, 2);
    assert_eq!(groups[0].items[0].player_id, 1);
}
