//! Shared fixtures for the promo workspace integration tests.
//!
//! The scenarios under `tests/` drive the real ledgers, catalog, sweeper
//! and orchestrator against a temporary data directory. The host side is
//! replaced by [`RecordingHost`], which accepts every command and keeps a
//! transcript of what it was asked to run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};

use promo_core::{
    CommandError, CommandExecutor, CommandRevoker, DefinitionStore, ExpirySweeper,
    PlayerDirectory, PromoService,
};
use promo_types::{ManualClock, PlayerId, PlayerSession, PromoCodeConfig};

/// Instant every scenario starts at.
pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Stand-in for the game host.
#[derive(Default)]
pub struct RecordingHost {
    sessions: Mutex<HashMap<PlayerId, PlayerSession>>,
    transcript: Mutex<Vec<(PlayerId, String)>>,
    notices: Mutex<Vec<(PlayerId, String)>>,
}

impl RecordingHost {
    pub fn join(&self, session: PlayerSession) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.player_id, session);
    }

    /// Every command executed so far, in order.
    pub fn transcript(&self) -> Vec<(PlayerId, String)> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn notices(&self) -> Vec<(PlayerId, String)> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandExecutor for RecordingHost {
    fn execute(&self, player_id: PlayerId, command: &str) -> Result<(), CommandError> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((player_id, command.to_string()));
        Ok(())
    }
}

impl PlayerDirectory for RecordingHost {
    fn find(&self, player_id: PlayerId) -> Option<PlayerSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&player_id)
            .cloned()
    }

    fn notify(&self, player_id: PlayerId, message: &str) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((player_id, message.to_string()));
    }
}

/// A fully wired service over one data directory.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub host: Arc<RecordingHost>,
    pub service: Arc<PromoService>,
    pub sweeper: Arc<ExpirySweeper>,
}

impl Harness {
    /// Open both ledgers in `data_dir` and load `codes` into the catalog.
    pub fn open(data_dir: &Path, codes: &[PromoCodeConfig]) -> Self {
        Self::open_with_clock(data_dir, codes, Arc::new(ManualClock::new(start_instant())))
    }

    /// Like [`Harness::open`] but sharing an existing clock, so a reopened
    /// service sees the same time as the one it replaces.
    pub fn open_with_clock(
        data_dir: &Path,
        codes: &[PromoCodeConfig],
        clock: Arc<ManualClock>,
    ) -> Self {
        let ledgers = promo_db::open(data_dir, clock.clone());
        let definitions = Arc::new(DefinitionStore::from_configs(codes, clock.clone()));
        let host = Arc::new(RecordingHost::default());
        let service = Arc::new(PromoService::new(
            definitions.clone(),
            ledgers.activations,
            ledgers.grants.clone(),
            host.clone(),
            host.clone(),
            clock.clone(),
        ));
        let revoker = Arc::new(CommandRevoker::new(definitions, host.clone(), host.clone()));
        let sweeper = Arc::new(ExpirySweeper::new(ledgers.grants, revoker));
        Self {
            clock,
            host,
            service,
            sweeper,
        }
    }
}

/// The stock `welcome` code with a custom quota.
pub fn welcome(max_activations: u32) -> PromoCodeConfig {
    PromoCodeConfig {
        name: "welcome".to_string(),
        max_activations,
        commands: vec!["give @p 363 1".to_string()],
        remove_commands: Vec::new(),
        permissions: Vec::new(),
        expiration_days: 30,
        expires_at: None,
        is_temporary: false,
        temporary_hours: 0,
    }
}

/// The stock one-day VIP code.
pub fn vip1day() -> PromoCodeConfig {
    PromoCodeConfig {
        name: "vip1day".to_string(),
        max_activations: 50,
        commands: vec!["addrole @pid VIP".to_string()],
        remove_commands: vec!["removerole @pid VIP".to_string()],
        permissions: vec!["promocode.vip".to_string()],
        expiration_days: 30,
        expires_at: None,
        is_temporary: true,
        temporary_hours: 24,
    }
}
