//! Periodic task scheduler.
//!
//! Each task is a tokio ticker that runs its job on the blocking pool and
//! listens on a shared shutdown broadcast. [`Scheduler::shutdown`] signals
//! every task and waits for it, so no tick fires after it returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Owns the periodic tasks and their cancellation signal.
pub struct Scheduler {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Run `job` every `period`, first after `initial_delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_periodic<F>(
        &mut self,
        name: &'static str,
        initial_delay: Duration,
        period: Duration,
        job: F,
    ) where
        F: Fn() + Send + Sync + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let job = Arc::new(job);
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let job = Arc::clone(&job);
                        if let Err(e) = tokio::task::spawn_blocking(move || job()).await {
                            warn!(task = name, error = %e, "periodic task failed");
                        }
                    }
                }
            }
            debug!(task = name, "periodic task stopped");
        });

        info!(task = name, period_secs = period.as_secs_f64(), "periodic task started");
        self.tasks.push((name, handle));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task and wait for it to finish its current tick.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(());
        for (name, handle) in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "periodic task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_periodic_task_ticks_until_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let c = counter.clone();
        scheduler.spawn_periodic("count", Duration::ZERO, Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(scheduler.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;
        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected several ticks, got {ticks}");
        assert_eq!(scheduler.task_count(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test]
    async fn test_initial_delay_respected() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let c = counter.clone();
        scheduler.spawn_periodic("late", Duration::from_secs(60), Duration::from_secs(60), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
