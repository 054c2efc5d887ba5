//! Expiry sweeper.
//!
//! Each tick moves `Idle -> Scanning -> Revoking* -> Idle`: it queries the
//! grants that are due, asks the [`RevokeCallback`] to take each reward
//! back and marks the grant revoked only once the callback succeeded. A
//! failed revoke leaves the grant due for the next tick and never stops the
//! rest of the batch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use promo_db::TemporaryGrantLedger;
use promo_types::TemporaryGrantRecord;

use crate::CommandError;

/// Shortest sweep interval accepted from configuration.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Takes a temporary reward back from the player.
pub trait RevokeCallback: Send + Sync {
    fn revoke(&self, grant: &TemporaryGrantRecord) -> Result<(), CommandError>;
}

/// Where the sweeper currently is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    Scanning,
    Revoking,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Grants that were due at scan time.
    pub due: usize,
    /// Ids revoked during this tick.
    pub revoked: Vec<String>,
    /// Grants whose callback failed.
    pub failed: usize,
    /// Whether the ledger was written.
    pub persisted: bool,
    /// The tick overlapped a running one and did nothing.
    pub skipped: bool,
}

/// Revokes expired temporary grants.
pub struct ExpirySweeper {
    grants: Arc<TemporaryGrantLedger>,
    callback: Arc<dyn RevokeCallback>,
    phase: Mutex<SweepPhase>,
}

/// Returns the sweeper to `Idle` when a tick ends, even by unwinding.
struct PhaseGuard<'a> {
    phase: &'a Mutex<SweepPhase>,
}

impl PhaseGuard<'_> {
    fn set(&self, phase: SweepPhase) {
        *lock(self.phase) = phase;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.set(SweepPhase::Idle);
    }
}

impl ExpirySweeper {
    pub fn new(grants: Arc<TemporaryGrantLedger>, callback: Arc<dyn RevokeCallback>) -> Self {
        Self {
            grants,
            callback,
            phase: Mutex::new(SweepPhase::Idle),
        }
    }

    pub fn phase(&self) -> SweepPhase {
        *lock(&self.phase)
    }

    /// Run one sweep.
    pub fn tick(&self) -> SweepReport {
        let guard = {
            let mut phase = lock(&self.phase);
            if *phase != SweepPhase::Idle {
                debug!("sweep already running, skipping tick");
                return SweepReport {
                    skipped: true,
                    ..SweepReport::default()
                };
            }
            *phase = SweepPhase::Scanning;
            PhaseGuard { phase: &self.phase }
        };

        let due = self.grants.due_for_revocation();
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };
        if due.is_empty() {
            return report;
        }

        guard.set(SweepPhase::Revoking);
        for grant in &due {
            match self.callback.revoke(grant) {
                Ok(()) => {
                    if self.grants.mark_revoked(&grant.id) {
                        report.revoked.push(grant.id.clone());
                    }
                }
                Err(e) => {
                    warn!(grant_id = %grant.id, player_id = grant.player_id, code = %grant.code_name, error = %e, "revocation failed, will retry");
                    report.failed += 1;
                }
            }
        }

        if !report.revoked.is_empty() {
            match self.grants.persist_if_dirty() {
                Ok(written) => report.persisted = written,
                Err(e) => error!(error = %e, "failed to persist revoked grants"),
            }
        }

        info!(
            due = report.due,
            revoked = report.revoked.len(),
            failed = report.failed,
            "expiry sweep finished"
        );
        drop(guard);
        report
    }
}

fn lock(phase: &Mutex<SweepPhase>) -> MutexGuard<'_, SweepPhase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}
