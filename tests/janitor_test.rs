//! Tests for the background [`Janitor`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use concierge::{Janitor, ManualClock, SessionStore, SlidingWindowLimiter, Sweep, TtlCache};

struct Passes(AtomicUsize);

impl Sweep for Passes {
    fn name(&self) -> &'static str {
        "passes"
    }

    fn sweep(&self, _now: Instant) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst);
        0
    }
}

struct Stores {
    clock: Arc<ManualClock>,
    limiter: Arc<SlidingWindowLimiter>,
    cache: Arc<TtlCache<String, u32>>,
    sessions: Arc<SessionStore>,
}

fn stores() -> Stores {
    let clock = Arc::new(ManualClock::new());
    Stores {
        limiter: Arc::new(
            SlidingWindowLimiter::new(10, Duration::from_secs(60), clock.clone()).unwrap(),
        ),
        cache: Arc::new(
            TtlCache::new(Duration::from_secs(60), 100, clock.clone())
                .unwrap()
                .with_label("products"),
        ),
        sessions: Arc::new(SessionStore::new(Duration::from_secs(60), 10, clock.clone()).unwrap()),
        clock,
    }
}

fn janitor(stores: &Stores, interval: Duration) -> Janitor {
    let limiter: Arc<dyn Sweep> = stores.limiter.clone();
    let cache: Arc<dyn Sweep> = stores.cache.clone();
    let sessions: Arc<dyn Sweep> = stores.sessions.clone();
    Janitor::new(stores.clock.clone(), interval)
        .unwrap()
        .watch(limiter)
        .watch(cache)
        .watch(sessions)
}

#[test]
fn run_once_sweeps_every_store() {
    let s = stores();
    s.limiter.admit("client");
    s.cache
        .insert("k".to_string(), 1, Duration::from_secs(30))
        .unwrap();
    s.sessions.create(None);
    s.sessions.create(None);

    let janitor = janitor(&s, Duration::from_secs(10));
    let report = janitor.run_once();
    assert_eq!(report.total(), 0);

    s.clock.advance(Duration::from_secs(61));
    let report = janitor.run_once();
    assert_eq!(report.get("limiter"), 1);
    assert_eq!(report.get("products"), 1);
    assert_eq!(report.get("sessions"), 2);
    assert_eq!(report.total(), 4);

    assert_eq!(s.limiter.tracked_keys(), 0);
    assert!(s.cache.is_empty());
    assert!(s.sessions.is_empty());
}

#[test]
fn live_entries_survive_a_pass() {
    let s = stores();
    s.clock.advance(Duration::from_secs(30));
    s.limiter.admit("client");
    let id = s.sessions.create(None);

    s.clock.advance(Duration::from_secs(45));
    let report = janitor(&s, Duration::from_secs(10)).run_once();
    assert_eq!(report.total(), 0);
    assert_eq!(s.limiter.tracked_keys(), 1);
    assert!(s.sessions.get(&id).is_some());
}

#[tokio::test(start_paused = true)]
async fn spawned_janitor_runs_every_interval() {
    let clock = Arc::new(ManualClock::new());
    let passes = Arc::new(Passes(AtomicUsize::new(0)));
    let target: Arc<dyn Sweep> = passes.clone();
    let handle = Janitor::new(clock, Duration::from_secs(10))
        .unwrap()
        .watch(target)
        .spawn();

    // no pass at startup
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(passes.0.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(26)).await;
    assert_eq!(passes.0.load(Ordering::SeqCst), 3);

    handle.shutdown().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(passes.0.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn spawned_janitor_evicts_expired_state() {
    let s = stores();
    s.limiter.admit("client");
    s.cache
        .insert("k".to_string(), 1, Duration::from_secs(30))
        .unwrap();
    s.clock.advance(Duration::from_secs(120));

    let handle = janitor(&s, Duration::from_secs(10)).spawn();
    // expired but still resident until a pass runs
    assert_eq!(s.limiter.tracked_keys(), 1);
    assert_eq!(s.cache.len(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(s.limiter.tracked_keys(), 0);
    assert_eq!(s.cache.len(), 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_janitor() {
    let clock = Arc::new(ManualClock::new());
    let passes = Arc::new(Passes(AtomicUsize::new(0)));
    let target: Arc<dyn Sweep> = passes.clone();
    let handle = Janitor::new(clock, Duration::from_secs(1))
        .unwrap()
        .watch(target)
        .spawn();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(passes.0.load(Ordering::SeqCst), 1);
    drop(handle);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(passes.0.load(Ordering::SeqCst), 1);
}
