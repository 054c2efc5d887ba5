//! Integration test: redemption through the orchestrator.
//!
//! Covers the outcome order of `activate`, quota enforcement under
//! concurrent redemption and cleanup of expired codes.

use std::sync::Arc;
use std::thread;

use chrono::Duration;

use promo_integration_tests::{vip1day, welcome, Harness};
use promo_types::{ActivationOutcome, PlayerSession};

#[test]
fn welcome_redemption_runs_commands_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[welcome(100)]);
    let alice = PlayerSession::new(76_561_198_000_000_001, "Alice");
    h.host.join(alice.clone());

    let outcome = h.service.activate(&alice, "WELCOME");
    let ActivationOutcome::Success(receipt) = outcome else {
        unreachable!("first redemption must succeed");
    };
    assert_eq!(receipt.code, "welcome");
    assert!(receipt.grant.is_none());
    assert_eq!(
        h.host.transcript(),
        vec![(alice.player_id, "give Alice 363 1".to_string())]
    );

    assert_eq!(
        h.service.activate(&alice, "welcome"),
        ActivationOutcome::AlreadyActivated {
            code: "welcome".to_string()
        }
    );
    assert_eq!(h.host.transcript().len(), 1);
    assert_eq!(h.service.activations().activation_count("welcome"), 1);
}

#[test]
fn outcomes_follow_evaluation_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut expired = welcome(10);
    expired.name = "spring".to_string();
    expired.expires_at = Some(promo_integration_tests::start_instant() - Duration::hours(1));
    let h = Harness::open(dir.path(), &[welcome(1), vip1day(), expired]);
    let bob = PlayerSession::new(2, "Bob");
    let carol = PlayerSession::new(3, "Carol");

    assert_eq!(h.service.activate(&bob, "nope").status(), "not_found");
    assert_eq!(h.service.activate(&bob, "spring").status(), "expired");
    assert_eq!(h.service.activate(&bob, "vip1day").status(), "no_permission");
    assert_eq!(h.service.activate(&bob, "   ").status(), "failed");

    assert!(h.service.activate(&bob, "welcome").is_success());
    assert_eq!(
        h.service.activate(&carol, "welcome"),
        ActivationOutcome::QuotaReached {
            code: "welcome".to_string(),
            max_activations: 1
        }
    );
    // Nothing but the successful redemption touched the ledger.
    assert_eq!(h.service.activations().len(), 1);
}

#[test]
fn concurrent_redemptions_never_exceed_quota() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[welcome(1)]);
    let service = Arc::clone(&h.service);

    let outcomes: Vec<ActivationOutcome> = thread::scope(|s| {
        let handles: Vec<_> = (1..=16u64)
            .map(|id| {
                let service = &service;
                s.spawn(move || {
                    service.activate(&PlayerSession::new(id, format!("p{id}")), "welcome")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread"))
            .collect()
    });

    let winners = outcomes.iter().filter(|o| o.is_success()).count();
    assert_eq!(winners, 1);
    assert!(outcomes
        .iter()
        .filter(|o| !o.is_success())
        .all(|o| matches!(o, ActivationOutcome::QuotaReached { .. })));
    assert_eq!(h.service.activations().activation_count("welcome"), 1);
    assert_eq!(h.host.transcript().len(), 1);
    assert!(h.service.activations().is_consistent());
}

#[test]
fn same_player_racing_itself_records_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[welcome(1)]);
    let dave = PlayerSession::new(4, "Dave");

    let outcomes: Vec<ActivationOutcome> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| h.service.activate(&dave, "welcome")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread"))
            .collect()
    });

    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);
    assert!(outcomes
        .iter()
        .filter(|o| !o.is_success())
        .all(|o| o.status() == "already_activated"));
    assert_eq!(h.service.activations().activations_for_player(4).len(), 1);
}

#[test]
fn purge_code_leaves_other_codes_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut spring = welcome(10);
    spring.name = "spring".to_string();
    let h = Harness::open(dir.path(), &[welcome(10), spring]);
    for id in 1..=3 {
        let player = PlayerSession::new(id, format!("p{id}"));
        assert!(h.service.activate(&player, "welcome").is_success());
        assert!(h.service.activate(&player, "spring").is_success());
    }

    let ledger = h.service.activations();
    assert_eq!(ledger.purge_code("WELCOME"), 3);
    assert_eq!(ledger.activation_count("welcome"), 0);
    assert!(ledger.list_activations(Some("welcome")).is_empty());
    assert_eq!(ledger.activation_count("spring"), 3);
    assert!(ledger.has_activated(2, "spring"));
    assert!(ledger.is_consistent());
}

#[test]
fn expired_code_cleanup_purges_its_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut short = welcome(10);
    short.expiration_days = 1;
    let h = Harness::open(dir.path(), &[short, vip1day()]);
    let erin = PlayerSession::new(5, "Erin").with_permissions(["promocode.vip"]);

    assert!(h.service.activate(&erin, "welcome").is_success());
    assert!(h.service.activate(&erin, "vip1day").is_success());
    assert!(h.service.remove_expired_codes().is_empty());

    h.clock.advance(Duration::days(2));
    assert_eq!(h.service.remove_expired_codes(), vec!["welcome".to_string()]);
    assert!(!h.service.definitions().contains("welcome"));
    assert!(!h.service.activations().has_activated(5, "welcome"));
    assert!(h.service.activations().has_activated(5, "vip1day"));
    assert_eq!(h.service.activate(&erin, "welcome").status(), "not_found");
}

#[test]
fn reload_prunes_records_of_dropped_codes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::open(dir.path(), &[welcome(10), vip1day()]);
    let frank = PlayerSession::new(6, "Frank").with_permissions(["promocode.vip"]);
    assert!(h.service.activate(&frank, "welcome").is_success());
    assert!(h.service.activate(&frank, "vip1day").is_success());
    assert!(h.service.flush());

    let summary = h.service.reload(&[welcome(10)]);
    assert_eq!(summary.codes, 1);
    assert_eq!(summary.activations, 2);
    assert_eq!(summary.grants, 1);

    assert_eq!(h.service.prune_orphans(), 2);
    assert_eq!(h.service.activations().len(), 1);
    assert!(h.service.grants().is_empty());
}
