//! Conversation session store.
//!
//! Sessions hold a bounded, ordered history of [`Turn`]s plus free-form
//! context and metadata maps. A session expires once it has been idle for
//! longer than the configured timeout; from then on every lookup treats it
//! exactly like an unknown id, whether or not the
//! [`Janitor`](crate::janitor::Janitor) has removed it yet.
//!
//! Sessions are stored in a [`DashMap`]. Every operation on one session runs
//! under the shard lock holding it, which serializes appends to the same
//! session and keeps the history within its cap.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::SessionConfig;
use crate::janitor::Sweep;
use crate::telemetry;
use crate::types::Turn;
use crate::{ConciergeError, Result};

#[derive(Debug)]
struct Session {
    user_id: Option<String>,
    created_at: Instant,
    last_activity: Instant,
    turns: VecDeque<Turn>,
    context: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl Session {
    fn new(user_id: Option<String>, now: Instant) -> Self {
        Self {
            user_id,
            created_at: now,
            last_activity: now,
            turns: VecDeque::new(),
            context: Map::new(),
            metadata: Map::new(),
        }
    }

    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }

    fn touch(&mut self, now: Instant) {
        // concurrent callers may arrive with slightly older readings
        self.last_activity = self.last_activity.max(now);
    }

    fn snapshot(&self, id: &str) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_owned(),
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            turns: self.turns.iter().cloned().collect(),
            context: self.context.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A point-in-time copy of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: String,
    pub user_id: Option<String>,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub turns: Vec<Turn>,
    pub context: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

/// Per-session conversation history with idle expiry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    timeout: Duration,
    max_history: usize,
    clock: SharedClock,
}

impl SessionStore {
    /// Create a store whose sessions expire after `timeout` of inactivity and
    /// keep at most `max_history` turns.
    pub fn new(timeout: Duration, max_history: usize, clock: SharedClock) -> Result<Self> {
        if timeout.is_zero() {
            return Err(ConciergeError::Configuration(
                "session timeout must be greater than zero".to_string(),
            ));
        }
        if max_history == 0 {
            return Err(ConciergeError::Configuration(
                "session max_history must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            sessions: DashMap::new(),
            timeout,
            max_history,
            clock,
        })
    }

    pub fn from_config(config: &SessionConfig, clock: SharedClock) -> Result<Self> {
        Self::new(config.timeout(), config.max_history, clock)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Resolve `session_id` to a live session, creating a fresh one when the
    /// id is absent, unknown or expired.
    ///
    /// Returns the id actually in use and a copy of its history. A new
    /// session always gets a newly generated id.
    pub fn get_or_create(&self, session_id: Option<&str>) -> (String, Vec<Turn>) {
        let now = self.clock.now();
        if let Some(id) = session_id {
            if let Some(mut session) = self.live(id, now) {
                session.touch(now);
                return (id.to_owned(), session.turns.iter().cloned().collect());
            }
        }
        (self.create_at(None, now), Vec::new())
    }

    /// Start an empty session, optionally owned by `user_id`.
    pub fn create(&self, user_id: Option<String>) -> String {
        self.create_at(user_id, self.clock.now())
    }

    /// Append `turn`, dropping the oldest turns beyond the history cap.
    ///
    /// Unknown and expired ids yield [`ConciergeError::SessionNotFound`]; a
    /// session is never created implicitly.
    pub fn append_turn(&self, session_id: &str, turn: Turn) -> Result<()> {
        self.append_turns(session_id, [turn])
    }

    /// Append several turns under one lock, so no other append to the same
    /// session lands between them.
    pub fn append_turns(
        &self,
        session_id: &str,
        turns: impl IntoIterator<Item = Turn>,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut session = self.live_or_not_found(session_id, now)?;
        session.turns.extend(turns);
        let mut dropped = 0usize;
        while session.turns.len() > self.max_history {
            session.turns.pop_front();
            dropped += 1;
        }
        session.touch(now);
        drop(session);

        if dropped > 0 {
            debug!(session_id, dropped, "session history truncated");
        }
        Ok(())
    }

    /// Mark the session active now.
    pub fn touch(&self, session_id: &str) -> Result<()> {
        let now = self.clock.now();
        self.live_or_not_found(session_id, now)?.touch(now);
        Ok(())
    }

    /// Copy of a live session. Counts as activity.
    pub fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        let now = self.clock.now();
        let mut session = self.live(session_id, now)?;
        session.touch(now);
        Some(session.snapshot(session_id))
    }

    /// Copy of a live session's history. Counts as activity.
    pub fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        let now = self.clock.now();
        let mut session = self.live_or_not_found(session_id, now)?;
        session.touch(now);
        Ok(session.turns.iter().cloned().collect())
    }

    /// Merge `context` into the session's context map.
    pub fn update_context(&self, session_id: &str, context: Map<String, Value>) -> Result<()> {
        let now = self.clock.now();
        let mut session = self.live_or_not_found(session_id, now)?;
        session.context.extend(context);
        session.touch(now);
        Ok(())
    }

    /// Merge `metadata` into the session's metadata map.
    pub fn update_metadata(&self, session_id: &str, metadata: Map<String, Value>) -> Result<()> {
        let now = self.clock.now();
        let mut session = self.live_or_not_found(session_id, now)?;
        session.metadata.extend(metadata);
        session.touch(now);
        Ok(())
    }

    /// Remove a session outright. Returns whether it existed.
    pub fn delete(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id, "session deleted");
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.sessions
            .iter()
            .filter(|s| !s.is_expired(now, self.timeout))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of live sessions active within the last `within`.
    pub fn active_sessions(&self, within: Duration) -> Vec<String> {
        let now = self.clock.now();
        self.sessions
            .iter()
            .filter(|s| {
                !s.is_expired(now, self.timeout)
                    && now.saturating_duration_since(s.last_activity) <= within
            })
            .map(|s| s.key().clone())
            .collect()
    }

    fn create_at(&self, user_id: Option<String>, now: Instant) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), Session::new(user_id, now));
        metrics::counter!(telemetry::SESSIONS_CREATED_TOTAL).increment(1);
        info!(session_id = %id, "session created");
        id
    }

    /// Mutable access to a session that has not expired.
    ///
    /// An expired session found on the way is removed.
    fn live(&self, session_id: &str, now: Instant) -> Option<RefMut<'_, String, Session>> {
        let session = self.sessions.get_mut(session_id)?;
        if !session.is_expired(now, self.timeout) {
            return Some(session);
        }
        drop(session);
        self.expire(session_id, now);
        None
    }

    fn live_or_not_found(
        &self,
        session_id: &str,
        now: Instant,
    ) -> Result<RefMut<'_, String, Session>> {
        self.live(session_id, now)
            .ok_or_else(|| ConciergeError::SessionNotFound(session_id.to_owned()))
    }

    fn expire(&self, session_id: &str, now: Instant) {
        let removed = self
            .sessions
            .remove_if(session_id, |_, s| s.is_expired(now, self.timeout));
        if removed.is_some() {
            metrics::counter!(telemetry::SESSIONS_EXPIRED_TOTAL).increment(1);
            debug!(session_id, "expired session dropped on lookup");
        }
    }
}

impl Sweep for SessionStore {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|_, s| {
            let keep = !s.is_expired(now, self.timeout);
            if !keep {
                evicted += 1;
            }
            keep
        });
        if evicted > 0 {
            metrics::counter!(telemetry::SESSIONS_EXPIRED_TOTAL).increment(evicted as u64);
        }
        evicted
    }
}
