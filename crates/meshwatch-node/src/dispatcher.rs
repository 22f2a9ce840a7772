//! Event dispatcher: reconciler events out to chat and the broadcast sink.
//!
//! Every event becomes a structured broadcast record unconditionally.
//! The human-readable chat notice is gated by the per-category flags in
//! [`NotifyFlags`]. The initialization message goes out as a CTCP
//! ACTION and is not gated — it is a lifecycle message, not a change
//! notification.

use tokio::sync::mpsc;

use meshwatch_types::config::NotifyFlags;
use meshwatch_types::{ChangeEvent, HighscoreEvent, Timestamp};

use crate::broadcast::BroadcastSink;
use crate::transport::Outbound;

// ---------------------------------------------------------------------------
// Notice texts
// ---------------------------------------------------------------------------

/// Chat notice for a change event, flag gating not applied.
///
/// `Initialized` has no notice text here — it is dispatched as an
/// action instead.
pub(crate) fn change_notice(event: &ChangeEvent) -> Option<String> {
    match event {
        ChangeEvent::Initialized { .. } => None,
        ChangeEvent::NewNode { name, .. } => Some(format!("Neuer Knoten: {name}")),
        ChangeEvent::NodeGone { name, .. } => Some(format!("Knoten gelöscht: {name}")),
        ChangeEvent::StatusChanged { name, online, .. } => Some(format!(
            "{name} ist jetzt {}",
            if *online { "online" } else { "offline" }
        )),
        ChangeEvent::Renamed {
            old_name, new_name, ..
        } => Some(format!("{old_name} heißt jetzt {new_name}")),
    }
}

/// Chat notice for a highscore event.
pub(crate) fn highscore_notice(event: &HighscoreEvent) -> String {
    match event {
        HighscoreEvent::Nodes { value } => {
            format!("Neuer Highscore: {value} bekannte Knoten")
        }
        HighscoreEvent::NodesOnline { value } => {
            format!("Neuer Highscore: {value} Knoten online")
        }
        HighscoreEvent::Clients { value } => {
            format!("Neuer Highscore: {value} Clients im Netz")
        }
        HighscoreEvent::NodeClients { name, value, .. } => {
            format!("Neuer Highscore für {name}: {value} Clients")
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Fans reconciler output out to the broadcast sink and the chat
/// transport.
pub struct Dispatcher {
    flags: NotifyFlags,
    /// Channel or nick all announcements go to.
    target: String,
    sink: BroadcastSink,
    outbound: mpsc::Sender<Outbound>,
}

impl Dispatcher {
    /// Creates a dispatcher announcing to `target`.
    pub fn new(
        flags: NotifyFlags,
        target: String,
        sink: BroadcastSink,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            flags,
            target,
            sink,
            outbound,
        }
    }

    /// Dispatches one change event: broadcast record always, chat
    /// notice if the category is enabled.
    pub async fn dispatch_change(&mut self, event: &ChangeEvent, now: Timestamp) {
        self.sink.publish(event, now);

        if let ChangeEvent::Initialized { count } = event {
            self.send(Outbound::Action {
                target: self.target.clone(),
                text: format!("ist initialisiert: {count} bekannte Knoten"),
            })
            .await;
            return;
        }

        let enabled = match event {
            ChangeEvent::Initialized { .. } => false,
            ChangeEvent::NewNode { .. } => self.flags.new_node,
            ChangeEvent::NodeGone { .. } => self.flags.node_gone,
            ChangeEvent::StatusChanged { .. } => self.flags.status_change,
            ChangeEvent::Renamed { .. } => self.flags.rename,
        };
        if !enabled {
            return;
        }

        if let Some(text) = change_notice(event) {
            self.send(Outbound::Notice {
                target: self.target.clone(),
                text,
            })
            .await;
        }
    }

    /// Dispatches one highscore event along the same dual path.
    pub async fn dispatch_highscore(&mut self, event: &HighscoreEvent, now: Timestamp) {
        self.sink.publish(event, now);

        if !self.flags.highscore {
            return;
        }

        self.send(Outbound::Notice {
            target: self.target.clone(),
            text: highscore_notice(event),
        })
        .await;
    }

    async fn send(&self, message: Outbound) {
        if self.outbound.send(message).await.is_err() {
            tracing::debug!("transport gone, dropping outbound message");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use meshwatch_types::NodeId;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn sink_path() -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "mw-dispatch-test-{}-{}",
            std::process::id(),
            id,
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("sink.log");
        std::fs::write(&path, b"").expect("touch sink file");
        path
    }

    fn new_node_event() -> ChangeEvent {
        ChangeEvent::NewNode {
            id: NodeId::new("aa"),
            name: "alpha".into(),
        }
    }

    #[test]
    fn notice_texts() {
        assert_eq!(
            change_notice(&new_node_event()).as_deref(),
            Some("Neuer Knoten: alpha")
        );
        assert_eq!(
            change_notice(&ChangeEvent::NodeGone {
                id: NodeId::new("aa"),
                name: "alpha".into(),
            })
            .as_deref(),
            Some("Knoten gelöscht: alpha")
        );
        assert_eq!(
            change_notice(&ChangeEvent::StatusChanged {
                id: NodeId::new("aa"),
                name: "alpha".into(),
                online: false,
            })
            .as_deref(),
            Some("alpha ist jetzt offline")
        );
        assert_eq!(
            change_notice(&ChangeEvent::Renamed {
                id: NodeId::new("aa"),
                old_name: "alt".into(),
                new_name: "neu".into(),
            })
            .as_deref(),
            Some("alt heißt jetzt neu")
        );
        assert!(change_notice(&ChangeEvent::Initialized { count: 5 }).is_none());
    }

    #[test]
    fn highscore_texts() {
        assert_eq!(
            highscore_notice(&HighscoreEvent::Clients { value: 99 }),
            "Neuer Highscore: 99 Clients im Netz"
        );
        assert_eq!(
            highscore_notice(&HighscoreEvent::NodeClients {
                id: NodeId::new("aa"),
                name: "alpha".into(),
                value: 15,
            }),
            "Neuer Highscore für alpha: 15 Clients"
        );
    }

    #[tokio::test]
    async fn disabled_category_still_broadcasts() {
        let path = sink_path();
        let (tx, mut rx) = mpsc::channel(8);
        let flags = NotifyFlags {
            new_node: false,
            ..NotifyFlags::default()
        };
        let mut dispatcher =
            Dispatcher::new(flags, "#mesh".into(), BroadcastSink::new(path.clone()), tx);

        dispatcher
            .dispatch_change(&new_node_event(), Timestamp::from_unix(7))
            .await;

        // No notice...
        assert!(rx.try_recv().is_err());
        // ...but the broadcast record is there.
        let body = std::fs::read_to_string(&path).expect("sink file");
        assert!(body.contains(r#""type":"new_node""#));
    }

    #[tokio::test]
    async fn enabled_category_sends_notice_to_target() {
        let path = sink_path();
        let (tx, mut rx) = mpsc::channel(8);
        let mut dispatcher = Dispatcher::new(
            NotifyFlags::default(),
            "#mesh".into(),
            BroadcastSink::new(path),
            tx,
        );

        dispatcher
            .dispatch_change(&new_node_event(), Timestamp::from_unix(7))
            .await;

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Notice {
                target: "#mesh".into(),
                text: "Neuer Knoten: alpha".into(),
            })
        );
    }

    #[tokio::test]
    async fn initialization_goes_out_as_action() {
        let path = sink_path();
        let (tx, mut rx) = mpsc::channel(8);
        let mut dispatcher = Dispatcher::new(
            NotifyFlags::default(),
            "#mesh".into(),
            BroadcastSink::new(path),
            tx,
        );

        dispatcher
            .dispatch_change(&ChangeEvent::Initialized { count: 12 }, Timestamp::from_unix(7))
            .await;

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Action {
                target: "#mesh".into(),
                text: "ist initialisiert: 12 bekannte Knoten".into(),
            })
        );
    }

    #[tokio::test]
    async fn highscore_notice_gated_by_flag() {
        let path = sink_path();
        let (tx, mut rx) = mpsc::channel(8);
        let flags = NotifyFlags {
            highscore: false,
            ..NotifyFlags::default()
        };
        let mut dispatcher = Dispatcher::new(flags, "#mesh".into(), BroadcastSink::new(path), tx);

        dispatcher
            .dispatch_highscore(&HighscoreEvent::Nodes { value: 3 }, Timestamp::from_unix(7))
            .await;

        assert!(rx.try_recv().is_err());
    }
}
