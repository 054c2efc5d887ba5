//! Background work owned by the service lifecycle.
//!
//! Four periodic tasks run next to request handling:
//!
//! | Task | Job |
//! |---|---|
//! | `activations-autosave` | persist the activation ledger if dirty |
//! | `grants-autosave` | persist the temporary grant ledger if dirty |
//! | `expiry-sweep` | one [`ExpirySweeper::tick`] |
//! | `expired-code-cleanup` | [`PromoService::remove_expired_codes`], then save the catalog |
//!
//! [`BackgroundTasks::shutdown`] stops all of them and flushes both ledgers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::catalog::DefinitionSink;
use crate::orchestrator::PromoService;
use crate::scheduler::Scheduler;
use crate::sweeper::{ExpirySweeper, SweepReport, MIN_SWEEP_INTERVAL};

/// Shortest autosave or expired-code check period.
pub const MIN_TASK_INTERVAL: Duration = Duration::from_secs(1);

/// Task periods and start delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskIntervals {
    pub autosave: Duration,
    pub sweep: Duration,
    pub sweep_delay: Duration,
    pub code_check: Duration,
    pub code_check_delay: Duration,
}

impl Default for TaskIntervals {
    fn default() -> Self {
        Self {
            autosave: Duration::from_secs(300),
            sweep: Duration::from_secs(60),
            sweep_delay: Duration::from_secs(10),
            code_check: Duration::from_secs(3600),
            code_check_delay: Duration::from_secs(60),
        }
    }
}

impl TaskIntervals {
    /// Raise every period to its floor; a zero period would spin.
    pub fn floored(self) -> Self {
        Self {
            autosave: self.autosave.max(MIN_TASK_INTERVAL),
            sweep: self.sweep.max(MIN_SWEEP_INTERVAL),
            code_check: self.code_check.max(MIN_TASK_INTERVAL),
            ..self
        }
    }
}

/// Optional observers of the background tasks.
#[derive(Clone, Default)]
pub struct TaskHooks {
    /// Called after every sweep that processed at least one grant.
    pub on_sweep: Option<Arc<dyn Fn(&SweepReport) + Send + Sync>>,
    /// Where the catalog is saved after expired codes were removed.
    pub definition_sink: Option<Arc<dyn DefinitionSink>>,
}

/// The running periodic tasks.
pub struct BackgroundTasks {
    scheduler: Scheduler,
    service: Arc<PromoService>,
}

impl BackgroundTasks {
    /// Start every periodic task. Must be called within a tokio runtime.
    pub fn start(
        service: Arc<PromoService>,
        sweeper: Arc<ExpirySweeper>,
        intervals: TaskIntervals,
        hooks: TaskHooks,
    ) -> Self {
        let intervals = intervals.floored();
        let mut scheduler = Scheduler::new();

        let activations = Arc::clone(service.activations());
        scheduler.spawn_periodic(
            "activations-autosave",
            intervals.autosave,
            intervals.autosave,
            move || {
                if let Err(e) = activations.persist_if_dirty() {
                    error!(error = %e, "activation autosave failed");
                }
            },
        );

        let grants = Arc::clone(service.grants());
        scheduler.spawn_periodic(
            "grants-autosave",
            intervals.autosave,
            intervals.autosave,
            move || {
                if let Err(e) = grants.persist_if_dirty() {
                    error!(error = %e, "temporary grant autosave failed");
                }
            },
        );

        let on_sweep = hooks.on_sweep.clone();
        scheduler.spawn_periodic(
            "expiry-sweep",
            intervals.sweep_delay,
            intervals.sweep,
            move || {
                let report = sweeper.tick();
                if report.due > 0 {
                    if let Some(hook) = &on_sweep {
                        hook(&report);
                    }
                }
            },
        );

        let cleanup_service = Arc::clone(&service);
        let sink = hooks.definition_sink;
        scheduler.spawn_periodic(
            "expired-code-cleanup",
            intervals.code_check_delay,
            intervals.code_check,
            move || {
                let removed = cleanup_service.remove_expired_codes();
                if removed.is_empty() {
                    return;
                }
                if let Some(sink) = &sink {
                    if let Err(e) = cleanup_service.definitions().save(sink.as_ref()) {
                        error!(error = %e, "failed to save catalog after removing expired codes");
                    }
                }
            },
        );

        info!(tasks = scheduler.task_count(), "background tasks started");
        Self { scheduler, service }
    }

    pub fn task_count(&self) -> usize {
        self.scheduler.task_count()
    }

    /// Stop every task, then persist whatever is still dirty.
    pub async fn shutdown(mut self) -> bool {
        self.scheduler.shutdown().await;
        let clean = self.service.flush();
        info!(clean, "background tasks stopped");
        clean
    }
}
