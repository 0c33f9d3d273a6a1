//! Topic coordinator integration tests.
//!
//! Every lock property is checked against both backends:
//! - `InMemoryTopicCoordinator`
//! - `SqliteTopicCoordinator` on a temporary database file

#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use outbox_relay::{
    Clock, InMemoryTopicCoordinator, LockConfig, LockState, ManualClock, SqliteDatabase,
    SqliteTopicCoordinator, TopicCoordinator, TopicLock,
};
use tempfile::TempDir;

const STALENESS: Duration = Duration::from_secs(60);
const QUARANTINE: Duration = Duration::from_secs(120);

/// Whole seconds, so SQLite's microsecond timestamps compare equal.
fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn config() -> LockConfig {
    LockConfig::default()
        .with_staleness_window(STALENESS)
        .with_quarantine_window(QUARANTINE)
}

/// A coordinator under test plus the clock that drives it.
struct Fixture {
    name: &'static str,
    coordinator: Box<dyn TopicCoordinator>,
    clock: ManualClock,
    _dir: Option<TempDir>,
}

impl Fixture {
    fn row(&self, topic: &str) -> TopicLock {
        self.coordinator
            .topic_locks()
            .unwrap()
            .into_iter()
            .find(|row| row.topic == topic)
            .unwrap_or_else(|| panic!("{}: no lock row for {topic}", self.name))
    }
}

fn fixtures() -> Vec<Fixture> {
    fixtures_with(config())
}

fn fixtures_with(config: LockConfig) -> Vec<Fixture> {
    let memory_clock = ManualClock::new(start());
    let memory = Fixture {
        name: "in-memory",
        coordinator: Box::new(InMemoryTopicCoordinator::with_clock(
            config.clone(),
            Arc::new(memory_clock.clone()),
        )),
        clock: memory_clock,
        _dir: None,
    };

    let dir = tempfile::tempdir().unwrap();
    let db = SqliteDatabase::open(&dir.path().join("locks.db")).unwrap();
    let sqlite_clock = ManualClock::new(start());
    let sqlite = Fixture {
        name: "sqlite",
        coordinator: Box::new(SqliteTopicCoordinator::with_clock(
            db,
            config,
            Arc::new(sqlite_clock.clone()),
        )),
        clock: sqlite_clock,
        _dir: Some(dir),
    };

    vec![memory, sqlite]
}

// ============================================================================
// Test 1: A fresh lock excludes other workers until it goes stale
// ============================================================================

#[test]
fn fresh_lock_blocks_other_workers_until_stale() {
    for f in fixtures() {
        let c = &f.coordinator;
        assert!(c.lock("orders", "a").unwrap(), "{}", f.name);
        assert!(!c.lock("orders", "b").unwrap(), "{}", f.name);
        assert_eq!(f.row("orders").state(), LockState::Owned("a".into()), "{}", f.name);

        f.clock.advance(STALENESS - Duration::from_secs(1));
        assert!(!c.lock("orders", "b").unwrap(), "{}", f.name);

        f.clock.advance(Duration::from_secs(2));
        assert!(c.lock("orders", "b").unwrap(), "{}", f.name);
        assert_eq!(f.row("orders").state(), LockState::Owned("b".into()), "{}", f.name);
    }
}

// ============================================================================
// Test 2: Relocking by the owner is idempotent
// ============================================================================

#[test]
fn owner_can_relock() {
    for f in fixtures() {
        assert!(f.coordinator.lock("orders", "a").unwrap(), "{}", f.name);
        assert!(f.coordinator.lock("orders", "a").unwrap(), "{}", f.name);
        assert_eq!(f.coordinator.topic_locks().unwrap().len(), 1, "{}", f.name);
    }
}

// ============================================================================
// Test 3: A heartbeat just before the deadline keeps the lock
// ============================================================================

#[test]
fn heartbeat_resets_staleness() {
    for f in fixtures() {
        let c = &f.coordinator;
        assert!(c.lock("orders", "a").unwrap());

        f.clock.advance(STALENESS - Duration::from_secs(1));
        assert!(c.heartbeat("orders", "a").unwrap(), "{}", f.name);

        // Past the original lock time, but not the heartbeat.
        f.clock.advance(Duration::from_secs(2));
        assert!(!c.lock("orders", "b").unwrap(), "{}", f.name);

        f.clock.advance(STALENESS);
        assert!(c.lock("orders", "b").unwrap(), "{}", f.name);
    }
}

// ============================================================================
// Test 4: Heartbeat from a non-owner changes nothing
// ============================================================================

#[test]
fn heartbeat_from_non_owner_is_rejected() {
    for f in fixtures() {
        let c = &f.coordinator;
        assert!(c.lock("orders", "a").unwrap());
        let before = f.row("orders");

        f.clock.advance(Duration::from_secs(5));
        assert!(!c.heartbeat("orders", "b").unwrap(), "{}", f.name);
        assert!(!c.heartbeat("missing", "a").unwrap(), "{}", f.name);

        assert_eq!(f.row("orders").locked_at, before.locked_at, "{}", f.name);
    }
}

// ============================================================================
// Test 5: register_error quarantines; clear_lock resets retries
// ============================================================================

#[test]
fn error_quarantine_then_clear() {
    for f in fixtures() {
        let c = &f.coordinator;
        assert!(c.lock("orders", "a").unwrap());
        c.register_error("orders", "a").unwrap();

        let row = f.row("orders");
        assert_eq!(row.state(), LockState::Errored, "{}", f.name);
        assert_eq!(row.retries, 1, "{}", f.name);
        assert!(!c.lock("orders", "a").unwrap(), "{}", f.name);
        assert!(!c.lock("orders", "b").unwrap(), "{}", f.name);

        // The staleness window alone does not lift the quarantine.
        f.clock.advance(STALENESS + Duration::from_secs(1));
        assert!(!c.lock("orders", "b").unwrap(), "{}", f.name);

        f.clock.advance(QUARANTINE - STALENESS);
        assert!(c.lock("orders", "b").unwrap(), "{}", f.name);
        let row = f.row("orders");
        assert!(!row.error, "{}", f.name);
        assert_eq!(row.retries, 1, "{}", f.name);

        c.clear_lock("orders", "b").unwrap();
        let row = f.row("orders");
        assert_eq!(row.state(), LockState::Idle, "{}", f.name);
        assert_eq!(row.retries, 0, "{}", f.name);
        assert_eq!(row.locked_at, None, "{}", f.name);
        assert_eq!(row.last_processed_at, Some(f.clock.now()), "{}", f.name);
    }
}

// ============================================================================
// Test 6: Only the owner can clear or quarantine a topic
// ============================================================================

#[test]
fn non_owner_cannot_release() {
    for f in fixtures() {
        let c = &f.coordinator;
        assert!(c.lock("orders", "a").unwrap());

        c.clear_lock("orders", "b").unwrap();
        c.register_error("orders", "b").unwrap();

        let row = f.row("orders");
        assert_eq!(row.state(), LockState::Owned("a".into()), "{}", f.name);
        assert_eq!(row.retries, 0, "{}", f.name);
    }
}

// ============================================================================
// Test 7: Pinging touches idle topics outside the exclusion list only
// ============================================================================

#[test]
fn ping_touches_idle_topics_only() {
    for f in fixtures() {
        let c = &f.coordinator;
        for topic in ["idle", "excluded", "owned", "errored"] {
            assert!(c.lock(topic, "a").unwrap());
        }
        c.clear_lock("idle", "a").unwrap();
        c.clear_lock("excluded", "a").unwrap();
        c.register_error("errored", "a").unwrap();
        let cleared_at = f.clock.now();

        f.clock.advance(Duration::from_secs(10));
        let touched = c.ping_empty_topics(&["excluded".to_string()]).unwrap();

        assert_eq!(touched, 1, "{}", f.name);
        assert_eq!(f.row("idle").last_processed_at, Some(f.clock.now()), "{}", f.name);
        assert_eq!(f.row("excluded").last_processed_at, Some(cleared_at), "{}", f.name);
        assert_eq!(f.row("owned").last_processed_at, None, "{}", f.name);
        assert_eq!(f.row("errored").last_processed_at, None, "{}", f.name);
    }
}

// ============================================================================
// Test 8: Windows past chrono's range never expire instead of panicking
// ============================================================================

#[test]
fn huge_windows_do_not_panic() {
    let config = LockConfig {
        staleness_window_ms: u64::MAX,
        quarantine_window_ms: u64::MAX,
    };
    for f in fixtures_with(config.clone()) {
        let c = &f.coordinator;
        assert_eq!(c.lock_config(), &config, "{}", f.name);

        assert!(c.lock("orders", "a").unwrap(), "{}", f.name);
        f.clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert!(!c.lock("orders", "b").unwrap(), "{}", f.name);

        c.register_error("orders", "a").unwrap();
        assert!(!c.lock("orders", "b").unwrap(), "{}", f.name);
        assert_eq!(f.row("orders").state(), LockState::Errored, "{}", f.name);
    }
}
