//! Node registry and per-cycle reconciliation.
//!
//! [`Registry`] owns the authoritative snapshot of known nodes plus the
//! aggregate counters for the current and previous cycle. Exactly one
//! snapshot is authoritative at any time; [`Registry::reconcile`]
//! replaces it at the end of each cycle. Callers share the registry
//! behind a single coarse `RwLock` — the reconciliation pass runs under
//! the write lock, command handling under read locks, and nothing else
//! ever reaches the snapshot.
//!
//! Removal is debounced: a node absent from the feed is carried forward
//! unchanged (stale online/clients values) for up to `delete_timeout`
//! consecutive cycles before it is dropped and reported as gone. A node
//! that reappears inside the grace period is treated as never having
//! left; its data refreshes and its absence counter resets.

use std::collections::HashMap;

use meshwatch_store::highscores::{HS_CLIENTS, HS_NODES, HS_NODES_ONLINE};
use meshwatch_store::{HighscoreRecord, HighscoreStore};
use meshwatch_types::{ChangeEvent, HighscoreEvent, NodeId, Timestamp};

// ---------------------------------------------------------------------------
// FetchedNode
// ---------------------------------------------------------------------------

/// One validated node record from the status feed.
///
/// The feed layer produces these; anything that failed validation never
/// reaches the reconciler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchedNode {
    /// Stable node identifier.
    pub id: NodeId,
    /// Display name as currently advertised.
    pub name: String,
    /// Whether the feed considers the node online.
    pub online: bool,
    /// Clients currently connected to the node.
    pub clients: u64,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A mesh node as tracked between cycles.
#[derive(Clone, Debug)]
pub struct Node {
    /// Stable identifier; never changes over the node's lifetime.
    pub id: NodeId,
    /// Display name (mutable between cycles).
    pub name: String,
    /// Online flag from the last cycle the node was observed.
    pub online: bool,
    /// Client count from the last cycle the node was observed.
    pub clients: u64,
    /// Cached max-clients record. `None` means not yet loaded from the
    /// highscore store (records load lazily on first touch).
    pub max_clients: Option<HighscoreRecord>,
    /// Consecutive cycles this node has been absent from the feed.
    /// Reset to 0 whenever the node is observed.
    pub delete_counter: u32,
}

impl Node {
    fn from_fetched(fetched: FetchedNode) -> Self {
        Self {
            id: fetched.id,
            name: fetched.name,
            online: fetched.online,
            clients: fetched.clients,
            max_clients: None,
            delete_counter: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Aggregate counters derived from a snapshot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    /// Registered nodes, grace-period nodes included.
    pub nodes: u64,
    /// Nodes whose online flag is set.
    pub online: u64,
    /// Sum of all client counts.
    pub clients: u64,
}

impl Counters {
    fn compute(snapshot: &Snapshot) -> Self {
        let mut counters = Self::default();
        for node in snapshot.values() {
            counters.nodes += 1;
            if node.online {
                counters.online += 1;
            }
            counters.clients += node.clients;
        }
        counters
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The complete known-node map at one point in time.
pub type Snapshot = HashMap<NodeId, Node>;

/// Authoritative node state plus current and previous aggregate counters.
pub struct Registry {
    nodes: Snapshot,
    counters: Counters,
    previous: Counters,
    delete_timeout: u32,
}

impl Registry {
    /// Creates an empty registry.
    ///
    /// `delete_timeout` is the number of consecutive absent cycles a
    /// node survives before being dropped and reported.
    pub fn new(delete_timeout: u32) -> Self {
        Self {
            nodes: Snapshot::new(),
            counters: Counters::default(),
            previous: Counters::default(),
            delete_timeout,
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &Snapshot {
        &self.nodes
    }

    /// Aggregate counters of the current snapshot.
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Aggregate counters of the immediately preceding cycle.
    pub fn previous_counters(&self) -> Counters {
        self.previous
    }

    /// Looks a node up by display name, falling back to the identifier.
    pub fn find(&self, name_or_id: &str) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| n.name == name_or_id)
            .or_else(|| self.nodes.get(&NodeId::new(name_or_id)))
    }

    /// Ingests one cycle's fetched node set and replaces the snapshot.
    ///
    /// Returns the change events for this transition, ordered
    /// new → gone → status-changed → renamed (order within a category
    /// is unspecified).
    ///
    /// An empty previous snapshot is treated as initialization: the
    /// fetched set is adopted as-is and a single
    /// [`ChangeEvent::Initialized`] is emitted instead of a diff.
    pub fn reconcile(&mut self, fetched: HashMap<NodeId, FetchedNode>) -> Vec<ChangeEvent> {
        if self.nodes.is_empty() {
            let count = fetched.len();
            self.nodes = fetched
                .into_iter()
                .map(|(id, f)| (id, Node::from_fetched(f)))
                .collect();
            self.roll_counters();
            return vec![ChangeEvent::Initialized { count }];
        }

        let mut new_events = Vec::new();
        let mut gone_events = Vec::new();
        let mut status_events = Vec::new();
        let mut rename_events = Vec::new();

        let mut next = Snapshot::with_capacity(fetched.len());

        for (id, f) in fetched {
            match self.nodes.get(&id) {
                None => {
                    new_events.push(ChangeEvent::NewNode {
                        id: id.clone(),
                        name: f.name.clone(),
                    });
                    next.insert(id, Node::from_fetched(f));
                }
                Some(prev) => {
                    if prev.online != f.online {
                        status_events.push(ChangeEvent::StatusChanged {
                            id: id.clone(),
                            name: f.name.clone(),
                            online: f.online,
                        });
                    }
                    if prev.name != f.name {
                        rename_events.push(ChangeEvent::Renamed {
                            id: id.clone(),
                            old_name: prev.name.clone(),
                            new_name: f.name.clone(),
                        });
                    }

                    // Fresh observation: data refreshes, absence counter
                    // resets, the highscore cache carries over.
                    let mut node = Node::from_fetched(f);
                    node.max_clients = prev.max_clients;
                    next.insert(id, node);
                }
            }
        }

        // Absent nodes: bump the counter; drop and report once it
        // reaches the timeout, otherwise carry the node forward with
        // its last-seen values (stale until it reappears).
        for (id, node) in &self.nodes {
            if next.contains_key(id) {
                continue;
            }

            let mut node = node.clone();
            node.delete_counter += 1;
            tracing::debug!(
                node = %node.name,
                cycles = node.delete_counter,
                "node absent from feed"
            );

            if node.delete_counter >= self.delete_timeout {
                gone_events.push(ChangeEvent::NodeGone {
                    id: id.clone(),
                    name: node.name.clone(),
                });
            } else {
                next.insert(id.clone(), node);
            }
        }

        self.nodes = next;
        self.roll_counters();

        let mut events = new_events;
        events.append(&mut gone_events);
        events.append(&mut status_events);
        events.append(&mut rename_events);
        events
    }

    /// Detects and persists new maxima after a reconcile.
    ///
    /// Global records are fed from the counters the reconcile just
    /// recomputed; per-node records load lazily from the store on first
    /// touch, then live in the node's cache. Store failures are logged
    /// and skipped — a broken highscore write must not lose the cycle's
    /// change events.
    pub fn track_highscores(
        &mut self,
        store: &HighscoreStore,
        now: Timestamp,
    ) -> Vec<HighscoreEvent> {
        let mut events = Vec::new();

        let globals = [
            (HS_NODES, self.counters.nodes),
            (HS_NODES_ONLINE, self.counters.online),
            (HS_CLIENTS, self.counters.clients),
        ];
        for (name, candidate) in globals {
            match store.update_global(name, candidate, now) {
                Ok(true) => events.push(match name {
                    HS_NODES => HighscoreEvent::Nodes { value: candidate },
                    HS_NODES_ONLINE => HighscoreEvent::NodesOnline { value: candidate },
                    _ => HighscoreEvent::Clients { value: candidate },
                }),
                Ok(false) => {}
                Err(e) => tracing::warn!(%e, highscore = name, "highscore update failed"),
            }
        }

        for node in self.nodes.values_mut() {
            let record = match node.max_clients {
                Some(record) => record,
                None => match store.node(&node.id) {
                    Ok(record) => {
                        node.max_clients = Some(record);
                        record
                    }
                    Err(e) => {
                        tracing::warn!(%e, node = %node.name, "highscore load failed");
                        continue;
                    }
                },
            };

            if node.clients <= record.value {
                continue;
            }

            match store.update_node(&node.id, node.clients, now) {
                Ok(_) => {
                    node.max_clients = Some(HighscoreRecord {
                        value: node.clients,
                        updated_at: now,
                    });
                    events.push(HighscoreEvent::NodeClients {
                        id: node.id.clone(),
                        name: node.name.clone(),
                        value: node.clients,
                    });
                }
                Err(e) => tracing::warn!(%e, node = %node.name, "highscore update failed"),
            }
        }

        events
    }

    fn roll_counters(&mut self) {
        self.previous = self.counters;
        self.counters = Counters::compute(&self.nodes);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(id: &str, name: &str, online: bool, clients: u64) -> (NodeId, FetchedNode) {
        (
            NodeId::new(id),
            FetchedNode {
                id: NodeId::new(id),
                name: name.into(),
                online,
                clients,
            },
        )
    }

    fn feed(nodes: &[(&str, &str, bool, u64)]) -> HashMap<NodeId, FetchedNode> {
        nodes
            .iter()
            .map(|(id, name, online, clients)| fetched(id, name, *online, *clients))
            .collect()
    }

    #[test]
    fn first_cycle_emits_only_initialized() {
        let mut reg = Registry::new(2);
        let events = reg.reconcile(feed(&[("a", "alpha", true, 3), ("b", "beta", false, 0)]));

        assert_eq!(events, vec![ChangeEvent::Initialized { count: 2 }]);
        assert_eq!(reg.snapshot().len(), 2);
        assert_eq!(reg.counters().nodes, 2);
        assert_eq!(reg.counters().online, 1);
        assert_eq!(reg.counters().clients, 3);
    }

    #[test]
    fn identical_feed_twice_is_idempotent() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", true, 3)]));
        let events = reg.reconcile(feed(&[("a", "alpha", true, 3)]));
        assert!(events.is_empty());
    }

    #[test]
    fn new_node_reported_once() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", true, 3)]));

        let events = reg.reconcile(feed(&[("a", "alpha", true, 3), ("b", "beta", true, 1)]));
        assert_eq!(
            events,
            vec![ChangeEvent::NewNode {
                id: NodeId::new("b"),
                name: "beta".into(),
            }]
        );

        let events = reg.reconcile(feed(&[("a", "alpha", true, 3), ("b", "beta", true, 1)]));
        assert!(events.is_empty());
    }

    #[test]
    fn status_flip_reports_exactly_one_event() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", false, 5)]));

        let events = reg.reconcile(feed(&[("a", "alpha", true, 5)]));
        assert_eq!(
            events,
            vec![ChangeEvent::StatusChanged {
                id: NodeId::new("a"),
                name: "alpha".into(),
                online: true,
            }]
        );
    }

    #[test]
    fn rename_reported_with_old_and_new_name() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", true, 0)]));

        let events = reg.reconcile(feed(&[("a", "aleph", true, 0)]));
        assert_eq!(
            events,
            vec![ChangeEvent::Renamed {
                id: NodeId::new("a"),
                old_name: "alpha".into(),
                new_name: "aleph".into(),
            }]
        );
        assert_eq!(reg.find("aleph").map(|n| n.id.as_str()), Some("a"));
    }

    #[test]
    fn client_count_changes_do_not_produce_events() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", true, 3)]));
        let events = reg.reconcile(feed(&[("a", "alpha", true, 9)]));
        assert!(events.is_empty());
        assert_eq!(reg.counters().clients, 9);
    }

    #[test]
    fn absent_node_kept_through_grace_period() {
        let mut reg = Registry::new(3);
        reg.reconcile(feed(&[("a", "alpha", true, 5), ("b", "beta", true, 1)]));

        for expected_counter in 1..=2 {
            let events = reg.reconcile(feed(&[("b", "beta", true, 1)]));
            assert!(events.is_empty(), "no gone event inside grace period");
            let node = reg.snapshot().get(&NodeId::new("a")).expect("still known");
            assert_eq!(node.delete_counter, expected_counter);
            // Stale until reappearance: values from the last sighting.
            assert!(node.online);
            assert_eq!(node.clients, 5);
        }
    }

    #[test]
    fn absent_node_dropped_exactly_at_timeout() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", true, 5), ("b", "beta", true, 1)]));

        let events = reg.reconcile(feed(&[("b", "beta", true, 1)]));
        assert!(events.is_empty());
        assert!(reg.snapshot().contains_key(&NodeId::new("a")));

        let events = reg.reconcile(feed(&[("b", "beta", true, 1)]));
        assert_eq!(
            events,
            vec![ChangeEvent::NodeGone {
                id: NodeId::new("a"),
                name: "alpha".into(),
            }]
        );
        assert!(!reg.snapshot().contains_key(&NodeId::new("a")));

        // And never again.
        let events = reg.reconcile(feed(&[("b", "beta", true, 1)]));
        assert!(events.is_empty());
    }

    #[test]
    fn reappearing_node_resets_counter_and_refreshes_data() {
        let mut reg = Registry::new(3);
        reg.reconcile(feed(&[("a", "alpha", true, 5)]));

        // Two absent cycles. An empty feed keeps "a" as the whole
        // snapshot, so absence is simulated with another node present.
        reg.reconcile(feed(&[("x", "other", true, 0)]));
        reg.reconcile(feed(&[("x", "other", true, 0)]));
        assert_eq!(
            reg.snapshot().get(&NodeId::new("a")).expect("kept").delete_counter,
            2
        );

        let events = reg.reconcile(feed(&[("a", "alpha", false, 2), ("x", "other", true, 0)]));
        // Not new, not gone — only the observable status flip.
        assert_eq!(
            events,
            vec![ChangeEvent::StatusChanged {
                id: NodeId::new("a"),
                name: "alpha".into(),
                online: false,
            }]
        );

        let node = reg.snapshot().get(&NodeId::new("a")).expect("kept");
        assert_eq!(node.delete_counter, 0);
        assert_eq!(node.clients, 2);
        assert!(!node.online);
    }

    #[test]
    fn grace_period_nodes_count_toward_aggregates() {
        let mut reg = Registry::new(3);
        reg.reconcile(feed(&[("a", "alpha", true, 5), ("b", "beta", true, 1)]));

        reg.reconcile(feed(&[("b", "beta", true, 1)]));
        // "a" is absent but inside its grace period: still counted with
        // its stale values.
        assert_eq!(reg.counters().nodes, 2);
        assert_eq!(reg.counters().online, 2);
        assert_eq!(reg.counters().clients, 6);
    }

    #[test]
    fn previous_counters_track_the_preceding_cycle() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("a", "alpha", true, 3)]));
        assert_eq!(reg.previous_counters(), Counters::default());

        reg.reconcile(feed(&[("a", "alpha", true, 7)]));
        assert_eq!(reg.previous_counters().clients, 3);
        assert_eq!(reg.counters().clients, 7);
    }

    #[test]
    fn event_order_is_new_gone_status_renamed() {
        let mut reg = Registry::new(1);
        reg.reconcile(feed(&[
            ("gone", "ghost", true, 0),
            ("flip", "flipper", false, 0),
            ("ren", "before", true, 0),
        ]));

        let events = reg.reconcile(feed(&[
            ("new", "newcomer", true, 0),
            ("flip", "flipper", true, 0),
            ("ren", "after", true, 0),
        ]));

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                ChangeEvent::Initialized { .. } => "init",
                ChangeEvent::NewNode { .. } => "new",
                ChangeEvent::NodeGone { .. } => "gone",
                ChangeEvent::StatusChanged { .. } => "status",
                ChangeEvent::Renamed { .. } => "renamed",
            })
            .collect();
        assert_eq!(kinds, vec!["new", "gone", "status", "renamed"]);
    }

    #[test]
    fn find_matches_name_then_id() {
        let mut reg = Registry::new(2);
        reg.reconcile(feed(&[("aa:bb", "alpha", true, 0)]));

        assert!(reg.find("alpha").is_some());
        assert!(reg.find("aa:bb").is_some());
        assert!(reg.find("nope").is_none());
    }
}
