//! Periodic eviction of expired state.
//!
//! The limiter, the TTL cache and the session store all treat expired
//! entries as absent on read, so correctness never depends on the janitor.
//! It exists to bound memory: entries nobody asks about again would
//! otherwise stay resident forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::telemetry;
use crate::{ConciergeError, Result};

/// A store the janitor can purge.
pub trait Sweep: Send + Sync {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Remove everything expired as of `now` and return how many entries went.
    fn sweep(&self, now: Instant) -> usize;
}

/// Eviction counts from one pass, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<(&'static str, usize)>,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.evicted.iter().map(|(_, n)| n).sum()
    }

    /// Evictions for one target, zero if it was not swept.
    pub fn get(&self, name: &str) -> usize {
        self.evicted
            .iter()
            .filter(|(target, _)| *target == name)
            .map(|(_, n)| n)
            .sum()
    }
}

/// Sweeps a set of stores on a fixed interval.
pub struct Janitor {
    targets: Vec<Arc<dyn Sweep>>,
    interval: Duration,
    clock: SharedClock,
}

impl std::fmt::Debug for Janitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Janitor")
            .field(
                "targets",
                &self.targets.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("interval", &self.interval)
            .finish()
    }
}

impl Janitor {
    pub fn new(clock: SharedClock, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(ConciergeError::Configuration(
                "janitor interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            targets: Vec::new(),
            interval,
            clock,
        })
    }

    /// Add a store to every subsequent pass.
    pub fn watch(mut self, target: Arc<dyn Sweep>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep every target once against the current clock reading.
    pub fn run_once(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        for target in &self.targets {
            let evicted = target.sweep(now);
            if evicted > 0 {
                metrics::counter!(telemetry::JANITOR_EVICTIONS_TOTAL, "target" => target.name())
                    .increment(evicted as u64);
            }
            report.evicted.push((target.name(), evicted));
        }

        let total = report.total();
        if total > 0 {
            info!(evicted = total, "janitor pass evicted expired entries");
        } else {
            debug!("janitor pass found nothing to evict");
        }
        report
    }

    /// Run [`run_once`](Self::run_once) on the tokio runtime every interval.
    ///
    /// The first pass happens one full interval after spawning. Must be called
    /// from within a runtime.
    pub fn spawn(self) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately on the first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                }
            }
            debug!("janitor stopped");
        });

        info!(interval_secs = period.as_secs(), "janitor started");
        JanitorHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owns a running janitor task. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl JanitorHandle {
    /// Stop the janitor and wait for an in-progress pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "janitor task ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::ManualClock;

    struct Counting {
        calls: AtomicUsize,
        per_pass: usize,
    }

    impl Sweep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn sweep(&self, _now: Instant) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.per_pass
        }
    }

    #[test]
    fn zero_interval_rejected() {
        let clock = Arc::new(ManualClock::new());
        assert!(matches!(
            Janitor::new(clock, Duration::ZERO),
            Err(ConciergeError::Configuration(_))
        ));
    }

    #[test]
    fn run_once_reports_each_target() {
        let clock = Arc::new(ManualClock::new());
        let target = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            per_pass: 3,
        });
        let janitor = Janitor::new(clock, Duration::from_secs(1))
            .unwrap()
            .watch(target.clone());

        let report = janitor.run_once();
        assert_eq!(report.total(), 3);
        assert_eq!(report.get("counting"), 3);
        assert_eq!(report.get("missing"), 0);
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_lists_target_names() {
        let clock = Arc::new(ManualClock::new());
        let janitor = Janitor::new(clock, Duration::from_secs(1))
            .unwrap()
            .watch(Arc::new(Counting {
                calls: AtomicUsize::new(0),
                per_pass: 0,
            }));
        assert!(format!("{janitor:?}").contains("counting"));
    }
}
