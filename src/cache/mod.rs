//! Caching subsystem.
//!
//! [`TtlCache`] is a time-boxed memoization cache. Callers opt in per call
//! site through [`TtlCache::get_or_compute`]; there is no implicit wrapping.
//!
//! # Architecture
//!
//! - Stored entries live in a bounded moka cache. Moka bounds memory by entry
//!   count; expiry is judged against the injected [`Clock`](crate::clock::Clock)
//!   through [`CacheEntry::is_valid_at`], on every read.
//! - Misses go through a single-flight table (see `flight.rs`) so concurrent
//!   callers for the same key share one computation.
//! - The [`Janitor`](crate::janitor::Janitor) removes expired entries in the
//!   background. Reads never depend on it having run.

mod flight;
pub mod ttl;

pub use ttl::TtlCache;

use std::time::{Duration, Instant};

/// A stored value together with the instant it was stored and its TTL.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, created_at: Instant, ttl: Duration) -> Self {
        Self {
            value,
            created_at,
            ttl,
        }
    }

    /// An entry is valid iff `now < created_at + ttl`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }
}
