//! The periodic fetch–reconcile–dispatch cycle.
//!
//! One cycle: fetch the feed (no lock held), parse and validate, take
//! the registry write lock for the reconciliation pass and highscore
//! updates, release it, then append change-log lines and dispatch
//! events. Transient feed errors skip the cycle and leave the registry
//! untouched.
//!
//! The pause between cycles starts only after a cycle fully completes,
//! so the effective period is `processing_time + update_interval` —
//! drift is deliberately not compensated. The first cycle waits until
//! the transport reports the channel joined.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;

use meshwatch_store::{ChangeLog, HighscoreStore};
use meshwatch_types::{ChangeEvent, HighscoreEvent, NodeId, Result, Timestamp};

use crate::dispatcher::Dispatcher;
use crate::feed::FeedClient;
use crate::registry::{Counters, Registry};

// ---------------------------------------------------------------------------
// CycleRunner
// ---------------------------------------------------------------------------

/// Owned state of the cycle driver task.
pub(crate) struct CycleRunner {
    pub feed: FeedClient,
    pub registry: Arc<RwLock<Registry>>,
    pub store: Arc<HighscoreStore>,
    pub changelog: ChangeLog,
    pub dispatcher: Dispatcher,
    pub interval_secs: u64,
    pub ready_rx: watch::Receiver<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Everything a cycle produced while the write lock was held.
struct CycleOutcome {
    events: Vec<ChangeEvent>,
    highscores: Vec<HighscoreEvent>,
    counters: Counters,
    previous: Counters,
    /// Nodes whose client count changed this cycle (new nodes included).
    client_changes: Vec<(NodeId, u64)>,
    /// Full directory contents, present only when the name file needs
    /// its initial seeding.
    seed: Option<Vec<(NodeId, String)>>,
}

impl CycleRunner {
    /// Runs cycles until shutdown is signalled.
    pub(crate) async fn run(mut self) {
        if !self.wait_ready().await {
            return;
        }
        tracing::info!("transport ready, starting polling cycles");

        loop {
            if let Err(e) = self.run_cycle().await {
                tracing::warn!(%e, "cycle skipped, registry unchanged");
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.interval_secs)) => {}
                _ = wait_shutdown(&mut self.shutdown_rx) => break,
            }
        }

        tracing::info!("cycle driver exited");
    }

    /// Blocks until the transport is ready, or returns `false` on
    /// shutdown / transport teardown.
    async fn wait_ready(&mut self) -> bool {
        loop {
            if *self.ready_rx.borrow() {
                return true;
            }
            tokio::select! {
                changed = self.ready_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = wait_shutdown(&mut self.shutdown_rx) => return false,
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<()> {
        // Network I/O happens strictly before the lock, so an in-flight
        // fetch never blocks command reads.
        let parsed = self.feed.fetch().await?;
        if parsed.skipped > 0 {
            tracing::warn!(skipped = parsed.skipped, "dropped malformed feed records");
        }

        let now = Timestamp::now();

        let outcome = {
            let mut registry = self.registry.write();

            // Sample client counts before reconciling; the log layer,
            // not the reconciler, reports client-count differences.
            let previous_clients: HashMap<NodeId, u64> = registry
                .snapshot()
                .iter()
                .map(|(id, node)| (id.clone(), node.clients))
                .collect();

            let events = registry.reconcile(parsed.nodes);
            let highscores = registry.track_highscores(&self.store, now);

            let mut client_changes = Vec::new();
            for (id, node) in registry.snapshot() {
                if previous_clients.get(id) != Some(&node.clients) {
                    client_changes.push((id.clone(), node.clients));
                }
            }

            let seed = if self.changelog.names_seeded() {
                None
            } else {
                let mut entries: Vec<(NodeId, String)> = registry
                    .snapshot()
                    .iter()
                    .map(|(id, node)| (id.clone(), node.name.clone()))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                Some(entries)
            };

            CycleOutcome {
                events,
                highscores,
                counters: registry.counters(),
                previous: registry.previous_counters(),
                client_changes,
                seed,
            }
        };

        self.write_changelog(&outcome, now);

        for event in &outcome.events {
            self.dispatcher.dispatch_change(event, now).await;
        }
        for event in &outcome.highscores {
            self.dispatcher.dispatch_highscore(event, now).await;
        }

        Ok(())
    }

    /// Appends this cycle's change-log lines. Failures are logged and
    /// swallowed — a full disk must not stop the bot.
    fn write_changelog(&self, outcome: &CycleOutcome, now: Timestamp) {
        fn check(result: Result<()>) {
            if let Err(e) = result {
                tracing::warn!(%e, "change-log write failed");
            }
        }

        if outcome.counters.nodes != outcome.previous.nodes {
            check(self.changelog.log_node_count(now, outcome.counters.nodes));
        }
        if outcome.counters.online != outcome.previous.online {
            check(self.changelog.log_online_count(now, outcome.counters.online));
        }
        if outcome.counters.clients != outcome.previous.clients {
            check(self.changelog.log_client_count(now, outcome.counters.clients));
        }

        for (id, clients) in &outcome.client_changes {
            check(self.changelog.log_node_clients(now, id, *clients));
        }

        match &outcome.seed {
            Some(entries) => {
                check(
                    self.changelog
                        .seed_names(entries.iter().map(|(id, name)| (id, name.as_str()))),
                );
            }
            None => {
                for event in &outcome.events {
                    match event {
                        ChangeEvent::NewNode { id, name } => {
                            check(self.changelog.append_name(id, name));
                        }
                        ChangeEvent::Renamed { id, new_name, .. } => {
                            check(self.changelog.append_name(id, new_name));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shutdown helper
// ---------------------------------------------------------------------------

/// Resolves once the shutdown flag is set (or its sender is gone).
pub(crate) async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
