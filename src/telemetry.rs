//! Telemetry metric name constants.
//!
//! Centralised metric names for concierge operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `concierge_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `outcome`: throttle decision: "admitted" or "denied"
//! - `cache`: cache instance label (e.g. "products")
//! - `target`: janitor sweep target (e.g. "sessions")

/// Throttle decisions made by the sliding-window limiter.
///
/// Labels: `outcome` ("admitted" | "denied").
pub const THROTTLE_DECISIONS_TOTAL: &str = "concierge_throttle_decisions_total";

/// Cache lookups answered from a stored, unexpired entry.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "concierge_cache_hits_total";

/// Cache lookups that started a new computation.
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "concierge_cache_misses_total";

/// Cache lookups that joined a computation already in flight.
///
/// Labels: `cache`.
pub const CACHE_COALESCED_TOTAL: &str = "concierge_cache_coalesced_total";

/// Computations that returned an error (nothing was stored).
///
/// Labels: `cache`.
pub const CACHE_FILL_FAILURES_TOTAL: &str = "concierge_cache_fill_failures_total";

/// Conversation sessions created.
pub const SESSIONS_CREATED_TOTAL: &str = "concierge_sessions_created_total";

/// Conversation sessions dropped after their idle timeout, on read or by sweep.
pub const SESSIONS_EXPIRED_TOTAL: &str = "concierge_sessions_expired_total";

/// Entries removed by the janitor.
///
/// Labels: `target`.
pub const JANITOR_EVICTIONS_TOTAL: &str = "concierge_janitor_evictions_total";
