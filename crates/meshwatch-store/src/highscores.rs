//! Durable highscore store: monotonic maxima with timestamps.
//!
//! Backed by sled with two trees:
//!
//! - `global` — highscore name → record (registered nodes, online
//!   nodes, total clients)
//! - `nodes` — node id → max-clients record
//!
//! A record only ever increases. [`HighscoreStore::update_global`] and
//! [`update_node`](HighscoreStore::update_node) are no-ops returning
//! `false` when the candidate does not exceed the stored value.

use std::path::Path;

use serde::{Deserialize, Serialize};

use meshwatch_types::{MeshwatchError, NodeId, Result, Timestamp};

// ---------------------------------------------------------------------------
// Global highscore keys
// ---------------------------------------------------------------------------

/// Global highscore: number of registered nodes.
pub const HS_NODES: &str = "nodes";

/// Global highscore: number of simultaneously online nodes.
pub const HS_NODES_ONLINE: &str = "nodes_online";

/// Global highscore: total connected clients.
pub const HS_CLIENTS: &str = "clients";

// ---------------------------------------------------------------------------
// HighscoreRecord
// ---------------------------------------------------------------------------

/// A stored maximum and the time it was last exceeded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HighscoreRecord {
    /// The maximum value observed so far.
    pub value: u64,
    /// When the value last increased.
    pub updated_at: Timestamp,
}

impl HighscoreRecord {
    /// The record a key has before its first update: zero at the epoch.
    pub fn zero() -> Self {
        Self {
            value: 0,
            updated_at: Timestamp::from_unix(0),
        }
    }
}

// ---------------------------------------------------------------------------
// HighscoreStore
// ---------------------------------------------------------------------------

/// sled-backed store for global and per-node highscores.
///
/// Values are serialized as small JSON blobs. Upserts are idempotent;
/// sled handles crash consistency, and [`flush`](Self::flush) forces
/// everything to disk at shutdown.
pub struct HighscoreStore {
    db: sled::Db,
    global: sled::Tree,
    nodes: sled::Tree,
}

impl HighscoreStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshwatchError::StorageError`] if the database or one
    /// of its trees cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| MeshwatchError::StorageError {
            reason: format!("failed to open sled database: {e}"),
        })?;

        let global = open_tree(&db, "global")?;
        let nodes = open_tree(&db, "nodes")?;

        Ok(Self { db, global, nodes })
    }

    /// Returns the global record for `name`, or the zero record if the
    /// key has never been updated.
    pub fn global(&self, name: &str) -> Result<HighscoreRecord> {
        get_record(&self.global, name.as_bytes())
    }

    /// Returns the max-clients record for `id`, or the zero record.
    pub fn node(&self, id: &NodeId) -> Result<HighscoreRecord> {
        get_record(&self.nodes, id.as_str().as_bytes())
    }

    /// Applies a candidate to the global record `name`.
    ///
    /// Returns `true` iff `candidate` exceeded the stored value; the
    /// record is then persisted with `now` as its timestamp.
    pub fn update_global(&self, name: &str, candidate: u64, now: Timestamp) -> Result<bool> {
        update_record(&self.global, name.as_bytes(), candidate, now)
    }

    /// Applies a candidate to the per-node max-clients record.
    ///
    /// Same contract as [`update_global`](Self::update_global).
    pub fn update_node(&self, id: &NodeId, candidate: u64, now: Timestamp) -> Result<bool> {
        update_record(&self.nodes, id.as_str().as_bytes(), candidate, now)
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| MeshwatchError::StorageError {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

fn open_tree(db: &sled::Db, name: &str) -> Result<sled::Tree> {
    db.open_tree(name).map_err(|e| MeshwatchError::StorageError {
        reason: format!("failed to open tree '{name}': {e}"),
    })
}

fn get_record(tree: &sled::Tree, key: &[u8]) -> Result<HighscoreRecord> {
    let raw = tree.get(key).map_err(|e| MeshwatchError::StorageError {
        reason: format!("sled get failed: {e}"),
    })?;

    match raw {
        None => Ok(HighscoreRecord::zero()),
        Some(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| MeshwatchError::StorageError {
                reason: format!("corrupt highscore record: {e}"),
            })
        }
    }
}

fn update_record(tree: &sled::Tree, key: &[u8], candidate: u64, now: Timestamp) -> Result<bool> {
    let current = get_record(tree, key)?;
    if candidate <= current.value {
        return Ok(false);
    }

    let record = HighscoreRecord {
        value: candidate,
        updated_at: now,
    };
    let bytes = serde_json::to_vec(&record).map_err(|e| MeshwatchError::StorageError {
        reason: format!("failed to encode highscore record: {e}"),
    })?;

    tree.insert(key, bytes).map_err(|e| MeshwatchError::StorageError {
        reason: format!("sled insert failed: {e}"),
    })?;

    Ok(true)
}
