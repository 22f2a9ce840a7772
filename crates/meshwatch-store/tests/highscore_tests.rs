//! Integration tests for the highscore store.
//!
//! All tests are deterministic — timestamps are injected via
//! `Timestamp::from_unix()`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use meshwatch_store::highscores::{HS_CLIENTS, HS_NODES, HS_NODES_ONLINE};
use meshwatch_store::HighscoreStore;
use meshwatch_types::{NodeId, Timestamp};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns a unique temporary directory for each test.
fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "mw-highscore-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ))
}

fn ts(secs: i64) -> Timestamp {
    Timestamp::from_unix(secs)
}

// ---------------------------------------------------------------------------
// Global records
// ---------------------------------------------------------------------------

#[test]
fn unknown_key_reads_as_zero() {
    let store = HighscoreStore::open(&temp_dir()).expect("open");
    let record = store.global(HS_NODES).expect("get");
    assert_eq!(record.value, 0);
}

#[test]
fn update_returns_true_iff_it_changed_the_value() {
    let store = HighscoreStore::open(&temp_dir()).expect("open");

    assert!(store.update_global(HS_CLIENTS, 10, ts(100)).expect("update"));
    assert!(!store.update_global(HS_CLIENTS, 10, ts(200)).expect("update"));
    assert!(!store.update_global(HS_CLIENTS, 9, ts(300)).expect("update"));
    assert!(store.update_global(HS_CLIENTS, 11, ts(400)).expect("update"));

    let record = store.global(HS_CLIENTS).expect("get");
    assert_eq!(record.value, 11);
    assert_eq!(record.updated_at.as_unix(), 400);
}

#[test]
fn rejected_update_keeps_timestamp() {
    let store = HighscoreStore::open(&temp_dir()).expect("open");

    store.update_global(HS_NODES_ONLINE, 5, ts(100)).expect("update");
    store.update_global(HS_NODES_ONLINE, 3, ts(999)).expect("update");

    let record = store.global(HS_NODES_ONLINE).expect("get");
    assert_eq!(record.value, 5);
    assert_eq!(record.updated_at.as_unix(), 100);
}

#[test]
fn stored_value_is_max_of_all_candidates() {
    let store = HighscoreStore::open(&temp_dir()).expect("open");

    for (i, candidate) in [3u64, 9, 1, 9, 12, 7, 12].iter().enumerate() {
        store
            .update_global(HS_NODES, *candidate, ts(i as i64))
            .expect("update");
    }

    assert_eq!(store.global(HS_NODES).expect("get").value, 12);
}

// ---------------------------------------------------------------------------
// Per-node records
// ---------------------------------------------------------------------------

#[test]
fn per_node_records_are_independent() {
    let store = HighscoreStore::open(&temp_dir()).expect("open");
    let a = NodeId::new("aa:aa");
    let b = NodeId::new("bb:bb");

    assert!(store.update_node(&a, 4, ts(10)).expect("update"));
    assert!(store.update_node(&b, 2, ts(10)).expect("update"));

    assert_eq!(store.node(&a).expect("get").value, 4);
    assert_eq!(store.node(&b).expect("get").value, 2);
}

#[test]
fn node_record_crossing_emits_single_increase() {
    // 10 -> 15: exactly one accepted update, new value and timestamp.
    let store = HighscoreStore::open(&temp_dir()).expect("open");
    let id = NodeId::new("cc:cc");

    store.update_node(&id, 10, ts(50)).expect("update");
    assert!(store.update_node(&id, 15, ts(60)).expect("update"));
    assert!(!store.update_node(&id, 15, ts(70)).expect("update"));

    let record = store.node(&id).expect("get");
    assert_eq!(record.value, 15);
    assert_eq!(record.updated_at.as_unix(), 60);
}

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

#[test]
fn records_survive_reopen() {
    let dir = temp_dir();
    let id = NodeId::new("dd:dd");

    {
        let store = HighscoreStore::open(&dir).expect("open");
        store.update_global(HS_NODES, 21, ts(500)).expect("update");
        store.update_node(&id, 8, ts(501)).expect("update");
        store.flush().expect("flush");
    }

    let store = HighscoreStore::open(&dir).expect("reopen");
    assert_eq!(store.global(HS_NODES).expect("get").value, 21);
    assert_eq!(store.node(&id).expect("get").value, 8);
    assert_eq!(store.node(&id).expect("get").updated_at.as_unix(), 501);
}
