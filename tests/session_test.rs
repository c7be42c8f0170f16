//! Tests for [`SessionStore`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use concierge::config::SessionConfig;
use concierge::{Clock, ConciergeError, ManualClock, Role, SessionStore, Sweep, Turn};

fn store(timeout_secs: u64, max_history: usize) -> (SessionStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let store =
        SessionStore::new(Duration::from_secs(timeout_secs), max_history, clock.clone()).unwrap();
    (store, clock)
}

fn contents(turns: &[Turn]) -> Vec<&str> {
    turns.iter().map(|t| t.content.as_str()).collect()
}

// ============================================================================
// get_or_create
// ============================================================================

#[test]
fn absent_id_creates_session() {
    let (store, _clock) = store(60, 10);
    let (id, history) = store.get_or_create(None);
    assert!(!id.is_empty());
    assert!(history.is_empty());
    assert_eq!(store.len(), 1);
}

#[test]
fn known_id_returns_history() {
    let (store, _clock) = store(60, 10);
    let (id, _) = store.get_or_create(None);
    store.append_turn(&id, Turn::user("hello")).unwrap();

    let (same, history) = store.get_or_create(Some(&id));
    assert_eq!(same, id);
    assert_eq!(contents(&history), ["hello"]);
}

#[test]
fn unknown_id_gets_fresh_session() {
    let (store, _clock) = store(60, 10);
    let (id, history) = store.get_or_create(Some("made-up"));
    assert_ne!(id, "made-up");
    assert!(history.is_empty());
}

#[test]
fn expired_id_gets_fresh_session_before_any_sweep() {
    let (store, clock) = store(30, 10);
    let (id, _) = store.get_or_create(None);
    store.append_turn(&id, Turn::user("hello")).unwrap();

    clock.advance(Duration::from_secs(31));
    let (fresh, history) = store.get_or_create(Some(&id));
    assert_ne!(fresh, id);
    assert!(history.is_empty());
}

#[test]
fn activity_extends_lifetime() {
    let (store, clock) = store(30, 10);
    let (id, _) = store.get_or_create(None);
    for _ in 0..5 {
        clock.advance(Duration::from_secs(20));
        store.append_turn(&id, Turn::user("still here")).unwrap();
    }
    let (same, history) = store.get_or_create(Some(&id));
    assert_eq!(same, id);
    assert_eq!(history.len(), 5);
}

// ============================================================================
// append_turn
// ============================================================================

#[test]
fn history_keeps_newest_turns() {
    let (store, _clock) = store(60, 2);
    let id = store.create(None);
    store.append_turn(&id, Turn::user("A")).unwrap();
    store.append_turn(&id, Turn::assistant("B")).unwrap();
    store.append_turn(&id, Turn::user("C")).unwrap();

    let history = store.history(&id).unwrap();
    assert_eq!(contents(&history), ["B", "C"]);
    assert_eq!(history[0].role, Role::Assistant);
}

#[test]
fn append_turns_caps_batch() {
    let (store, _clock) = store(60, 3);
    let id = store.create(None);
    store
        .append_turns(&id, ["1", "2", "3", "4", "5"].map(Turn::user))
        .unwrap();
    assert_eq!(contents(&store.history(&id).unwrap()), ["3", "4", "5"]);
}

#[test]
fn append_to_unknown_session_fails() {
    let (store, _clock) = store(60, 10);
    assert_eq!(
        store.append_turn("nope", Turn::user("hi")),
        Err(ConciergeError::SessionNotFound("nope".into()))
    );
    assert!(store.is_empty());
}

#[test]
fn append_to_expired_session_fails() {
    let (store, clock) = store(30, 10);
    let id = store.create(None);
    clock.advance(Duration::from_secs(31));
    assert_eq!(
        store.append_turn(&id, Turn::user("hi")),
        Err(ConciergeError::SessionNotFound(id.clone()))
    );
    assert_eq!(
        store.history(&id),
        Err(ConciergeError::SessionNotFound(id))
    );
}

#[test]
fn intent_is_kept_on_turns() {
    let (store, _clock) = store(60, 10);
    let id = store.create(None);
    store
        .append_turn(&id, Turn::user("cheap phones?").with_intent("product_search"))
        .unwrap();
    let history = store.history(&id).unwrap();
    assert_eq!(history[0].intent.as_deref(), Some("product_search"));
}

// ============================================================================
// Bookkeeping
// ============================================================================

#[test]
fn delete_removes_session() {
    let (store, _clock) = store(60, 10);
    let id = store.create(Some("user-7".into()));
    assert!(store.delete(&id));
    assert!(!store.delete(&id));
    assert!(store.get(&id).is_none());
}

#[test]
fn active_sessions_filters_by_recency() {
    let (store, clock) = store(600, 10);
    let old = store.create(None);
    clock.advance(Duration::from_secs(120));
    let recent = store.create(None);
    clock.advance(Duration::from_secs(30));

    let active = store.active_sessions(Duration::from_secs(60));
    assert_eq!(active, vec![recent]);
    assert_eq!(store.active_sessions(Duration::from_secs(600)).len(), 2);
    assert!(store.get(&old).is_some());
}

#[test]
fn snapshot_carries_timestamps() {
    let (store, clock) = store(60, 10);
    let id = store.create(None);
    let created = clock.now();
    clock.advance(Duration::from_secs(5));
    store.touch(&id).unwrap();

    let snapshot = store.get(&id).unwrap();
    assert_eq!(snapshot.id, id);
    assert_eq!(snapshot.created_at, created);
    assert_eq!(snapshot.last_activity, clock.now());
}

#[test]
fn sweep_removes_only_expired() {
    let (store, clock) = store(30, 10);
    store.create(None);
    clock.advance(Duration::from_secs(20));
    let live = store.create(None);
    clock.advance(Duration::from_secs(15));

    assert_eq!(store.sweep(clock.now()), 1);
    assert_eq!(store.len(), 1);
    assert!(store.get(&live).is_some());
}

#[test]
fn from_config_applies_limits() {
    let clock = Arc::new(ManualClock::new());
    let config = SessionConfig {
        timeout_secs: 90,
        max_history: 4,
    };
    let store = SessionStore::from_config(&config, clock).unwrap();
    assert_eq!(store.timeout(), Duration::from_secs(90));
    assert_eq!(store.max_history(), 4);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_appends_stay_within_cap() {
    let (store, _clock) = store(60, 20);
    let store = Arc::new(store);
    let id = store.create(None);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    store
                        .append_turn(&id, Turn::user(format!("{t}-{i}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let history = store.history(&id).unwrap();
    assert_eq!(history.len(), 20);
}

#[test]
fn concurrent_batches_are_not_interleaved() {
    let (store, _clock) = store(60, 1_000);
    let store = Arc::new(store);
    let id = store.create(None);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let q = format!("q{t}-{i}");
                    let a = format!("a{t}-{i}");
                    store
                        .append_turns(&id, [Turn::user(q), Turn::assistant(a)])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let history = store.history(&id).unwrap();
    assert_eq!(history.len(), 200);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[0].content[1..], pair[1].content[1..]);
    }
}
