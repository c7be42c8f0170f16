//! Sliding-window request throttle.
//!
//! Each client key owns a record of the instants at which its requests were
//! admitted. A request is admitted when fewer than `max_requests` of those
//! instants fall inside the trailing window `[now - window, now]`. The lower
//! bound is inclusive: a request admitted exactly one window ago still
//! counts.
//!
//! Records live in a [`DashMap`], so a decision only locks the shard that
//! holds its key. Pruning, counting and recording happen under that one
//! shard lock, which makes decisions for the same key linearizable.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

use crate::clock::SharedClock;
use crate::config::LimiterConfig;
use crate::janitor::Sweep;
use crate::telemetry;
use crate::{ConciergeError, Result};

/// Outcome of a throttle decision, with enough detail for rate-limit
/// response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request was admitted (and recorded).
    pub allowed: bool,
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window after this decision.
    pub remaining: u32,
    /// On denial, how long until the oldest counted request leaves the window.
    pub retry_after: Option<Duration>,
}

impl Admission {
    /// An admission that was never subject to throttling.
    pub fn unlimited(limit: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            retry_after: None,
        }
    }
}

#[derive(Debug, Default)]
struct WindowRecord {
    hits: VecDeque<Instant>,
}

impl WindowRecord {
    /// Drop every hit older than `now - window`.
    fn prune(&mut self, now: Instant, window: Duration) {
        if let Some(cutoff) = now.checked_sub(window) {
            // Hits are recorded by concurrent callers and can land slightly
            // out of order, so a front-only scan is not enough.
            self.hits.retain(|&hit| hit >= cutoff);
        }
    }

    fn count_within(&self, now: Instant, window: Duration) -> usize {
        match now.checked_sub(window) {
            Some(cutoff) => self.hits.iter().filter(|&&hit| hit >= cutoff).count(),
            None => self.hits.len(),
        }
    }

    fn oldest(&self) -> Option<Instant> {
        self.hits.iter().min().copied()
    }
}

/// Per-client sliding-window throttle.
///
/// Window length and request limit are shared by every key.
///
/// ```rust
/// # use concierge::clock::{ManualClock, SharedClock};
/// # use concierge::limiter::SlidingWindowLimiter;
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// let clock = Arc::new(ManualClock::new());
/// let limiter =
///     SlidingWindowLimiter::new(2, Duration::from_secs(60), clock.clone() as SharedClock).unwrap();
/// assert!(limiter.admit("10.0.0.1"));
/// assert!(limiter.admit("10.0.0.1"));
/// assert!(!limiter.admit("10.0.0.1"));
/// clock.advance(Duration::from_secs(61));
/// assert!(limiter.admit("10.0.0.1"));
/// ```
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    records: DashMap<String, WindowRecord>,
    max_requests: u32,
    window: Duration,
    clock: SharedClock,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `max_requests` per `window` per key.
    ///
    /// Both must be non-zero.
    pub fn new(max_requests: u32, window: Duration, clock: SharedClock) -> Result<Self> {
        if max_requests == 0 {
            return Err(ConciergeError::Configuration(
                "limiter max_requests must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ConciergeError::Configuration(
                "limiter window must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            records: DashMap::new(),
            max_requests,
            window,
            clock,
        })
    }

    pub fn from_config(config: &LimiterConfig, clock: SharedClock) -> Result<Self> {
        Self::new(config.max_requests, config.window(), clock)
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or deny a request from `key` at the current clock reading.
    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, self.clock.now())
    }

    /// Admit or deny a request from `key` at `now`.
    pub fn admit_at(&self, key: &str, now: Instant) -> bool {
        self.check_at(key, now).allowed
    }

    /// Like [`admit`](Self::admit), reporting the quota alongside the decision.
    pub fn check(&self, key: &str) -> Admission {
        self.check_at(key, self.clock.now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Admission {
        let mut record = match self.records.get_mut(key) {
            Some(record) => record,
            None => self.records.entry(key.to_owned()).or_default(),
        };
        record.prune(now, self.window);

        let used = record.hits.len();
        let admission = if used < self.max_requests as usize {
            record.hits.push_back(now);
            Admission {
                allowed: true,
                limit: self.max_requests,
                remaining: self.remaining_after(used + 1),
                retry_after: None,
            }
        } else {
            Admission {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                retry_after: record
                    .oldest()
                    .map(|oldest| (oldest + self.window).saturating_duration_since(now)),
            }
        };
        drop(record);

        if admission.allowed {
            metrics::counter!(telemetry::THROTTLE_DECISIONS_TOTAL, "outcome" => "admitted")
                .increment(1);
        } else {
            metrics::counter!(telemetry::THROTTLE_DECISIONS_TOTAL, "outcome" => "denied")
                .increment(1);
            warn!(client = key, limit = self.max_requests, "request throttled");
        }
        admission
    }

    /// Requests `key` may still make in the current window.
    ///
    /// Never creates a record; an unseen key reports the full limit.
    pub fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, self.clock.now())
    }

    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        let used = self
            .records
            .get(key)
            .map_or(0, |record| record.count_within(now, self.window));
        self.remaining_after(used)
    }

    /// Forget every request recorded for `key`.
    pub fn reset(&self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    /// Number of keys with a record, including idle ones not yet swept.
    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }

    fn remaining_after(&self, used: usize) -> u32 {
        let used = u32::try_from(used).unwrap_or(u32::MAX);
        self.max_requests.saturating_sub(used)
    }
}

impl Sweep for SlidingWindowLimiter {
    fn name(&self) -> &'static str {
        "limiter"
    }

    /// Drop records whose every hit has left the window.
    fn sweep(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.records.retain(|_, record| {
            record.prune(now, self.window);
            if record.hits.is_empty() {
                evicted += 1;
                false
            } else {
                true
            }
        });
        evicted
    }
}
