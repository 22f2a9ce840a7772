//! Core shared types for the meshwatch network status bot.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Stable identifier of a mesh node.
///
/// The status feed keys nodes by a MAC-like string (e.g.
/// `"c0:ff:ee:00:12:34"`). The identifier never changes over a node's
/// lifetime; everything else (name, online flag, client count) may.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new `NodeId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// UTC timestamp.
///
/// Persisted in highscore records, printed in chat replies, and written
/// as unix seconds in change-log lines. All timestamps are UTC so log
/// series stay monotonic regardless of the host timezone.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` representing the current UTC time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a `Timestamp` from unix seconds.
    ///
    /// Out-of-range values (beyond what chrono can represent) fall back
    /// to the unix epoch.
    pub fn from_unix(secs: i64) -> Self {
        let dt = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH);
        Self(dt)
    }

    /// Returns the timestamp as unix seconds.
    pub fn as_unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// Returns the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Short date form used in chat replies, e.g. `2026-03-01 14:05`.
    pub fn format_short(&self) -> String {
        self.0.format("%Y-%m-%d %H:%M").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// Per-cycle node state transitions produced by the reconciler.
///
/// The enum is closed on purpose: the dispatcher matches exhaustively,
/// so adding a variant forces every consumer to decide how to handle it.
/// Serialized form is the type-tagged record written to the broadcast
/// sink (`{"type":"new_node",...}`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// First cycle adopted the fetched node set as-is.
    Initialized {
        /// Number of nodes in the adopted snapshot.
        count: usize,
    },
    /// A node identifier was seen for the first time.
    NewNode {
        /// Identifier of the new node.
        id: NodeId,
        /// Display name at first sighting.
        name: String,
    },
    /// A node exhausted its delete grace period and was dropped.
    ///
    /// Carries the *old* record — the fetched data no longer has it.
    NodeGone {
        /// Identifier of the removed node.
        id: NodeId,
        /// Last known display name.
        name: String,
    },
    /// A known node's online flag flipped.
    StatusChanged {
        /// Identifier of the node.
        id: NodeId,
        /// Current display name.
        name: String,
        /// The new online state.
        online: bool,
    },
    /// A known node's display name changed.
    Renamed {
        /// Identifier of the node.
        id: NodeId,
        /// Name before this cycle.
        old_name: String,
        /// Name observed this cycle.
        new_name: String,
    },
}

// ---------------------------------------------------------------------------
// HighscoreEvent
// ---------------------------------------------------------------------------

/// A monotonic maximum was exceeded and persisted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HighscoreEvent {
    /// New maximum of registered nodes.
    Nodes {
        /// The new record value.
        value: u64,
    },
    /// New maximum of simultaneously online nodes.
    NodesOnline {
        /// The new record value.
        value: u64,
    },
    /// New maximum of total connected clients.
    Clients {
        /// The new record value.
        value: u64,
    },
    /// A single node exceeded its own max-clients record.
    NodeClients {
        /// Identifier of the node.
        id: NodeId,
        /// Current display name.
        name: String,
        /// The new record value.
        value: u64,
    },
}

// ---------------------------------------------------------------------------
// MeshwatchError
// ---------------------------------------------------------------------------

/// Central error type for the meshwatch system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum MeshwatchError {
    /// Fetching or decoding the status feed failed; the cycle is skipped.
    #[error("feed error: {reason}")]
    FeedError {
        /// Human-readable description of the fetch/decode failure.
        reason: String,
    },

    /// A single fetched node record failed validation and was dropped.
    #[error("invalid record: {reason}")]
    InvalidRecord {
        /// Which required field was missing or malformed.
        reason: String,
    },

    /// A highscore store or change-log operation failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// The broadcast sink rejected a write (consumer gone).
    #[error("sink error: {reason}")]
    SinkError {
        /// Human-readable description of the sink failure.
        reason: String,
    },

    /// The chat transport failed (connect, register, send).
    #[error("transport error: {reason}")]
    TransportError {
        /// Human-readable description of the transport failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`MeshwatchError`].
pub type Result<T> = std::result::Result<T, MeshwatchError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
