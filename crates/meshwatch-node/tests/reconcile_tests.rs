//! Multi-cycle reconciliation scenarios.
//!
//! Drives the registry exactly the way the cycle driver does — a
//! sequence of fetched node sets — and checks the event stream and the
//! highscore side effects across cycles. All timestamps are injected.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use meshwatch_node::registry::{FetchedNode, Registry};
use meshwatch_store::HighscoreStore;
use meshwatch_types::{ChangeEvent, HighscoreEvent, NodeId, Timestamp};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "mw-reconcile-test-{}-{}",
        std::process::id(),
        id,
    ))
}

fn feed(nodes: &[(&str, &str, bool, u64)]) -> HashMap<NodeId, FetchedNode> {
    nodes
        .iter()
        .map(|(id, name, online, clients)| {
            (
                NodeId::new(*id),
                FetchedNode {
                    id: NodeId::new(*id),
                    name: (*name).to_string(),
                    online: *online,
                    clients: *clients,
                },
            )
        })
        .collect()
}

fn gone_ids(events: &[ChangeEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ChangeEvent::NodeGone { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Debounce across many cycles
// ---------------------------------------------------------------------------

#[test]
fn node_absent_shorter_than_timeout_is_never_reported() {
    let mut reg = Registry::new(4);
    reg.reconcile(feed(&[("a", "alpha", true, 1), ("b", "beta", true, 1)]));

    // Three absent cycles with timeout 4: counter climbs, nothing is
    // reported, the node stays in the snapshot.
    for expected in 1..=3u32 {
        let events = reg.reconcile(feed(&[("b", "beta", true, 1)]));
        assert!(events.is_empty(), "cycle {expected}: {events:?}");
        let node = &reg.snapshot()[&NodeId::new("a")];
        assert_eq!(node.delete_counter, expected);
    }

    // Reappearance: no new/gone events, counter back to zero.
    let events = reg.reconcile(feed(&[("a", "alpha", true, 1), ("b", "beta", true, 1)]));
    assert!(events.is_empty());
    assert_eq!(reg.snapshot()[&NodeId::new("a")].delete_counter, 0);
}

#[test]
fn two_cycle_timeout_scenario() {
    // previous={A,B}, fetched={B}, DELETE_TIMEOUT=2:
    // cycle 1 keeps A with counter=1, cycle 2 removes and reports it.
    let mut reg = Registry::new(2);
    reg.reconcile(feed(&[("A", "alpha", true, 0), ("B", "beta", true, 0)]));

    let events = reg.reconcile(feed(&[("B", "beta", true, 0)]));
    assert!(gone_ids(&events).is_empty());
    assert_eq!(reg.snapshot()[&NodeId::new("A")].delete_counter, 1);

    let events = reg.reconcile(feed(&[("B", "beta", true, 0)]));
    assert_eq!(gone_ids(&events), vec!["A"]);
    assert!(!reg.snapshot().contains_key(&NodeId::new("A")));
}

#[test]
fn gone_event_carries_the_old_record() {
    let mut reg = Registry::new(1);
    reg.reconcile(feed(&[("a", "alpha", true, 3), ("b", "beta", true, 0)]));

    // The node vanishes; the fetched data knows nothing about it, so
    // the event must carry the name from the previous snapshot.
    let events = reg.reconcile(feed(&[("b", "beta", true, 0)]));
    assert_eq!(
        events,
        vec![ChangeEvent::NodeGone {
            id: NodeId::new("a"),
            name: "alpha".into(),
        }]
    );
}

#[test]
fn flapping_node_is_reported_only_on_real_transitions() {
    let mut reg = Registry::new(3);
    reg.reconcile(feed(&[("a", "alpha", true, 0), ("b", "beta", true, 0)]));

    // Absent, back, absent, back — never long enough to be dropped.
    for _ in 0..2 {
        let events = reg.reconcile(feed(&[("b", "beta", true, 0)]));
        assert!(events.is_empty());
        let events = reg.reconcile(feed(&[("a", "alpha", true, 0), ("b", "beta", true, 0)]));
        assert!(events.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Highscores across cycles
// ---------------------------------------------------------------------------

#[test]
fn per_node_highscore_crossing_emits_exactly_one_event() {
    let store = HighscoreStore::open(&temp_dir()).expect("open store");
    let mut reg = Registry::new(2);

    reg.reconcile(feed(&[("a", "alpha", true, 10)]));
    let events = reg.track_highscores(&store, Timestamp::from_unix(100));
    assert!(events
        .iter()
        .any(|e| matches!(e, HighscoreEvent::NodeClients { value: 10, .. })));

    // Same value again: nothing.
    reg.reconcile(feed(&[("a", "alpha", true, 10)]));
    let events = reg.track_highscores(&store, Timestamp::from_unix(200));
    assert!(events.is_empty());

    // 10 -> 15: exactly one per-node event, store updated.
    reg.reconcile(feed(&[("a", "alpha", true, 15)]));
    let events = reg.track_highscores(&store, Timestamp::from_unix(300));
    let node_events: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, HighscoreEvent::NodeClients { .. }))
        .collect();
    assert_eq!(node_events.len(), 1);

    let record = store.node(&NodeId::new("a")).expect("record");
    assert_eq!(record.value, 15);
    assert_eq!(record.updated_at.as_unix(), 300);
}

#[test]
fn global_highscores_follow_the_counters() {
    let store = HighscoreStore::open(&temp_dir()).expect("open store");
    let mut reg = Registry::new(2);

    reg.reconcile(feed(&[("a", "alpha", true, 4), ("b", "beta", false, 0)]));
    let events = reg.track_highscores(&store, Timestamp::from_unix(100));
    assert!(events.contains(&HighscoreEvent::Nodes { value: 2 }));
    assert!(events.contains(&HighscoreEvent::NodesOnline { value: 1 }));
    assert!(events.contains(&HighscoreEvent::Clients { value: 4 }));

    // Shrinking network: maxima stay, no events.
    reg.reconcile(feed(&[("a", "alpha", true, 1)]));
    reg.reconcile(feed(&[("a", "alpha", true, 1)]));
    reg.reconcile(feed(&[("a", "alpha", true, 1)]));
    let events = reg.track_highscores(&store, Timestamp::from_unix(200));
    assert!(events.is_empty());
    assert_eq!(store.global("nodes").expect("record").value, 2);
}

#[test]
fn lazy_loaded_records_survive_restarts() {
    let dir = temp_dir();
    {
        let store = HighscoreStore::open(&dir).expect("open store");
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", true, 9)]));
        reg.track_highscores(&store, Timestamp::from_unix(100));
        store.flush().expect("flush");
    }

    // Fresh registry, same store: the old record gates new events.
    let store = HighscoreStore::open(&dir).expect("reopen store");
    let mut reg = Registry::new(2);
    reg.reconcile(feed(&[("a", "alpha", true, 5)]));
    let events = reg.track_highscores(&store, Timestamp::from_unix(200));
    assert!(!events
        .iter()
        .any(|e| matches!(e, HighscoreEvent::NodeClients { .. })));

    reg.reconcile(feed(&[("a", "alpha", true, 12)]));
    let events = reg.track_highscores(&store, Timestamp::from_unix(300));
    assert!(events
        .iter()
        .any(|e| matches!(e, HighscoreEvent::NodeClients { value: 12, .. })));
}
