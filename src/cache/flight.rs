//! Single-flight bookkeeping for cache fills.
//!
//! A flight is one computation for one key. Its result is published through
//! a `tokio::sync::watch` channel; every caller interested in the key holds a
//! receiver and waits for the slot to become `Some`. Because `watch` keeps the
//! last value, a caller that joins late still sees the result.
//!
//! The computation runs on its own spawned task. Waiters only hold
//! receivers, so a waiter giving up (timeout, dropped request) has no effect
//! on the computation or on the other waiters.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::{ConciergeError, Result};

/// Slot a flight publishes its outcome into.
pub(crate) type Outcome<V> = Option<Result<V>>;

/// Receiving end of a flight.
pub(crate) type Flight<V> = watch::Receiver<Outcome<V>>;

/// Keys currently being computed, shared with the flight tasks.
pub(crate) type FlightTable<K, V> = Arc<DashMap<K, Flight<V>>>;

/// Wait for a flight to publish its outcome.
///
/// A flight whose task ended without publishing (panic, runtime shutdown)
/// yields [`ConciergeError::ComputeAbandoned`].
pub(crate) async fn land<V: Clone>(mut flight: Flight<V>) -> Result<V> {
    let outcome = match flight.wait_for(Option::is_some).await {
        Ok(slot) => slot.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or(Err(ConciergeError::ComputeAbandoned))
}

/// Removes a key from the flight table when the flight ends, however it ends.
pub(crate) struct FlightGuard<K: Hash + Eq, V> {
    key: Option<K>,
    table: FlightTable<K, V>,
}

impl<K: Hash + Eq, V> FlightGuard<K, V> {
    pub(crate) fn new(key: K, table: FlightTable<K, V>) -> Self {
        Self {
            key: Some(key),
            table,
        }
    }

    /// Remove the key now rather than at drop.
    pub(crate) fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(key) = self.key.take() {
            self.table.remove(&key);
        }
    }
}

impl<K: Hash + Eq, V> Drop for FlightGuard<K, V> {
    fn drop(&mut self) {
        self.remove();
    }
}
