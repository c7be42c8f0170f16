//! Time-boxed memoization cache with single-flight fills.
//!
//! [`TtlCache::get_or_compute`] returns the stored value while it is valid
//! and otherwise runs the supplied computation, storing its result with the
//! requested TTL. Concurrent callers asking for the same missing key share
//! one computation and all observe its outcome, success or error. A failed
//! computation stores nothing, so the next caller starts afresh.
//!
//! # Waiting and cancellation
//!
//! The computation runs on a spawned tokio task. A caller can bound its own
//! wait with [`TtlCache::get_or_compute_within`]; when the deadline passes the
//! caller gets [`ConciergeError::Timeout`] while the computation carries on
//! for any other waiters and still fills the cache when it finishes. The
//! same holds when a caller's future is simply dropped.
//!
//! # Panics
//!
//! The computing methods spawn onto the current tokio runtime and must be
//! called from within one.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use moka::ops::compute::{CompResult, Op};
use tokio::sync::watch;
use tracing::debug;

use super::CacheEntry;
use super::flight::{self, Flight, FlightGuard, FlightTable};
use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::janitor::Sweep;
use crate::telemetry;
use crate::{ConciergeError, Result};

/// Default metrics label for caches that were not given one.
const DEFAULT_LABEL: &str = "default";

/// Either a value that was already stored, or a flight to wait on.
enum Slot<V> {
    Ready(V),
    Waiting(Flight<V>),
}

/// Generic key → value memoization cache with per-entry TTL.
///
/// Values are cloned out on every hit; wrap large values in `Arc`.
pub struct TtlCache<K, V> {
    entries: moka::sync::Cache<K, CacheEntry<V>>,
    in_flight: FlightTable<K, V>,
    default_ttl: Duration,
    enabled: bool,
    label: &'static str,
    clock: SharedClock,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `max_entries` entries, using
    /// `default_ttl` for [`get_or_compute_default`](Self::get_or_compute_default).
    pub fn new(default_ttl: Duration, max_entries: u64, clock: SharedClock) -> Result<Self> {
        if default_ttl.is_zero() {
            return Err(ConciergeError::Configuration(
                "cache default TTL must be greater than zero".to_string(),
            ));
        }
        if max_entries == 0 {
            return Err(ConciergeError::Configuration(
                "cache max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            entries: moka::sync::Cache::new(max_entries),
            in_flight: Arc::new(DashMap::new()),
            default_ttl,
            enabled: true,
            label: DEFAULT_LABEL,
            clock,
        })
    }

    pub fn from_config(config: &CacheConfig, clock: SharedClock) -> Result<Self> {
        let cache = Self::new(config.ttl(), config.max_entries, clock)?;
        Ok(cache.enabled(config.enabled))
    }

    /// Label used on this cache's metrics and janitor logs.
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// A disabled cache computes on every call and never stores.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the valid entry for `key`, computing and storing it on a miss.
    pub async fn get_or_compute<F, Fut>(&self, key: K, ttl: Duration, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.fill(key, ttl, None, compute).await
    }

    /// [`get_or_compute`](Self::get_or_compute) with the configured default TTL.
    pub async fn get_or_compute_default<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.fill(key, self.default_ttl, None, compute).await
    }

    /// [`get_or_compute`](Self::get_or_compute), waiting at most `deadline`.
    ///
    /// On timeout the computation is left running; it still fills the cache
    /// and still answers every other waiter.
    pub async fn get_or_compute_within<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        deadline: Duration,
        compute: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.fill(key, ttl, Some(deadline), compute).await
    }

    /// Non-computing lookup. Expired entries are reported absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.lookup(key, self.clock.now());
        if found.is_some() {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.label).increment(1);
        }
        found
    }

    /// Store `value` directly, replacing any existing entry.
    pub fn insert(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        check_ttl(ttl)?;
        if self.enabled {
            self.entries
                .insert(key, CacheEntry::new(value, self.clock.now(), ttl));
        }
        Ok(())
    }

    /// Remove the entry for `key`.
    ///
    /// A computation already in flight for `key` still stores its result.
    pub fn invalidate(&self, key: &K) {
        self.entries.invalidate(key);
    }

    /// Remove every stored entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys with a computation in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn fill<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        deadline: Option<Duration>,
        compute: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        check_ttl(ttl)?;
        if !self.enabled {
            return compute().await;
        }

        if let Some(value) = self.lookup(&key, self.clock.now()) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.label).increment(1);
            return Ok(value);
        }

        let flight = match self.join_or_launch(key, ttl, compute) {
            Slot::Ready(value) => return Ok(value),
            Slot::Waiting(flight) => flight,
        };

        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, flight::land(flight))
                .await
                .map_err(|_| ConciergeError::Timeout(deadline))?,
            None => flight::land(flight).await,
        }
    }

    /// Join the flight for `key`, or start one.
    ///
    /// Runs entirely under the flight table's shard lock for `key`, so two
    /// callers can never both start a flight for the same key.
    fn join_or_launch<F, Fut>(&self, key: K, ttl: Duration, compute: F) -> Slot<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(flight) => {
                metrics::counter!(telemetry::CACHE_COALESCED_TOTAL, "cache" => self.label)
                    .increment(1);
                Slot::Waiting(flight.get().clone())
            }
            Entry::Vacant(vacant) => {
                // A flight stores its value before leaving the table, so a
                // flight that landed since our first lookup is visible here.
                if let Some(value) = self.lookup(&key, self.clock.now()) {
                    metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.label)
                        .increment(1);
                    return Slot::Ready(value);
                }
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => self.label)
                    .increment(1);

                let (publish, flight) = watch::channel(None);
                vacant.insert(flight.clone());
                self.launch(key, ttl, compute, publish);
                Slot::Waiting(flight)
            }
        }
    }

    fn launch<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        compute: F,
        publish: watch::Sender<flight::Outcome<V>>,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let entries = self.entries.clone();
        let guard = FlightGuard::new(key.clone(), Arc::clone(&self.in_flight));
        let clock = Arc::clone(&self.clock);
        let label = self.label;

        tokio::spawn(async move {
            let outcome = compute().await;
            match &outcome {
                Ok(value) => {
                    entries.insert(key, CacheEntry::new(value.clone(), clock.now(), ttl));
                    debug!(cache = label, ttl_secs = ttl.as_secs(), "cache filled");
                }
                Err(e) => {
                    metrics::counter!(telemetry::CACHE_FILL_FAILURES_TOTAL, "cache" => label)
                        .increment(1);
                    debug!(cache = label, error = %e, "cache fill failed, nothing stored");
                }
            }
            // Leave the table before publishing: later callers then either
            // hit the stored entry or, after a failure, start a fresh flight.
            guard.release();
            // Every receiver may be gone already; nobody left to tell.
            let _ = publish.send(Some(outcome));
        });
    }

    fn lookup(&self, key: &K, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.value)
    }
}

impl<K, V> Sweep for TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.label
    }

    fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_valid_at(now))
            .map(|(key, _)| K::clone(&key))
            .collect();

        let mut evicted = 0;
        for key in expired {
            // Re-check under the entry lock: a refill may have landed since
            // the scan, and it must survive.
            let result = self.entries.entry(key).and_compute_with(|current| match current {
                Some(entry) if !entry.value().is_valid_at(now) => Op::Remove,
                _ => Op::Nop,
            });
            if matches!(result, CompResult::Removed(_)) {
                evicted += 1;
            }
        }
        evicted
    }
}

fn check_ttl(ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
        return Err(ConciergeError::InvalidInput(
            "cache TTL must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
