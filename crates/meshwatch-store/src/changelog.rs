//! Append-only change-log writer.
//!
//! Produces the time-series files an external plotter consumes:
//!
//! ```text
//! nodecount.log        <unix_ts> <node_count>
//! onlinenodecount.log  <unix_ts> <online_count>
//! totalclientcount.log <unix_ts> <client_count>
//! nodeclientcount.log  <unix_ts> <node_id> <client_count>
//! nodenames.log        <node_id> <display name>
//! ```
//!
//! The name directory is seeded with every known node when the file is
//! first created and appended for new or renamed nodes thereafter.
//! Aggregate series get a line only when the value changed, so the
//! plotted step functions carry no redundant samples.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use meshwatch_types::{MeshwatchError, NodeId, Result, Timestamp};

const FILE_NODE_COUNT: &str = "nodecount.log";
const FILE_ONLINE_COUNT: &str = "onlinenodecount.log";
const FILE_CLIENT_COUNT: &str = "totalclientcount.log";
const FILE_NODE_CLIENTS: &str = "nodeclientcount.log";
const FILE_NODE_NAMES: &str = "nodenames.log";

// ---------------------------------------------------------------------------
// ChangeLog
// ---------------------------------------------------------------------------

/// Writer for the append-only change-log directory.
pub struct ChangeLog {
    dir: PathBuf,
}

impl ChangeLog {
    /// Opens the change-log directory, creating it if necessary.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| MeshwatchError::StorageError {
            reason: format!("failed to create change-log directory: {e}"),
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Whether the node-name directory file already exists.
    pub fn names_seeded(&self) -> bool {
        self.dir.join(FILE_NODE_NAMES).exists()
    }

    /// Writes the initial node-name directory.
    ///
    /// Call once, when [`names_seeded`](Self::names_seeded) is false;
    /// later additions go through [`append_name`](Self::append_name).
    pub fn seed_names<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a NodeId, &'a str)>,
    {
        let mut body = String::new();
        for (id, name) in entries {
            body.push_str(id.as_str());
            body.push(' ');
            body.push_str(name);
            body.push('\n');
        }
        self.append(FILE_NODE_NAMES, &body)
    }

    /// Appends one entry to the node-name directory.
    pub fn append_name(&self, id: &NodeId, name: &str) -> Result<()> {
        self.append(FILE_NODE_NAMES, &format!("{} {}\n", id.as_str(), name))
    }

    /// Appends a registered-node-count sample.
    pub fn log_node_count(&self, ts: Timestamp, value: u64) -> Result<()> {
        self.append(FILE_NODE_COUNT, &format!("{} {}\n", ts.as_unix(), value))
    }

    /// Appends an online-node-count sample.
    pub fn log_online_count(&self, ts: Timestamp, value: u64) -> Result<()> {
        self.append(FILE_ONLINE_COUNT, &format!("{} {}\n", ts.as_unix(), value))
    }

    /// Appends a total-client-count sample.
    pub fn log_client_count(&self, ts: Timestamp, value: u64) -> Result<()> {
        self.append(FILE_CLIENT_COUNT, &format!("{} {}\n", ts.as_unix(), value))
    }

    /// Appends a per-node client-count sample.
    pub fn log_node_clients(&self, ts: Timestamp, id: &NodeId, clients: u64) -> Result<()> {
        self.append(
            FILE_NODE_CLIENTS,
            &format!("{} {} {}\n", ts.as_unix(), id.as_str(), clients),
        )
    }

    fn append(&self, file: &str, data: &str) -> Result<()> {
        let path = self.dir.join(file);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MeshwatchError::StorageError {
                reason: format!("failed to open {}: {e}", path.display()),
            })?;
        f.write_all(data.as_bytes())
            .map_err(|e| MeshwatchError::StorageError {
                reason: format!("failed to append to {}: {e}", path.display()),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
