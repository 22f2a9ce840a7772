//! Bot configuration with sensible defaults.
//!
//! All operational parameters of the reconciliation engine are
//! centralized here. Every value has a documented default; transport
//! endpoints and file-system layout live in the daemon crate.

use serde::{Deserialize, Serialize};

use crate::{MeshwatchError, Result};

// ---------------------------------------------------------------------------
// NotifyFlags
// ---------------------------------------------------------------------------

/// Per-event-category switches for chat notices.
///
/// These gate only the human-readable notice. The structured broadcast
/// record is always written regardless of flags.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyFlags {
    /// Announce nodes seen for the first time.
    pub new_node: bool,
    /// Announce nodes dropped after the delete grace period.
    pub node_gone: bool,
    /// Announce online/offline flips.
    pub status_change: bool,
    /// Announce display-name changes.
    pub rename: bool,
    /// Announce new global and per-node highscores.
    pub highscore: bool,
}

impl Default for NotifyFlags {
    fn default() -> Self {
        Self {
            new_node: true,
            node_gone: true,
            status_change: true,
            rename: true,
            highscore: true,
        }
    }
}

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

/// Global bot configuration.
///
/// Loaded from the daemon's JSON config file; unset fields keep their
/// defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// URL of the node status feed (JSON document).
    pub feed_url: String,

    /// Seconds to sleep between polling cycles. The sleep starts after
    /// a cycle fully completes, so the effective period is
    /// `processing_time + update_interval_secs`.
    pub update_interval_secs: u64,

    /// Number of consecutive cycles a node may be absent from the feed
    /// before it is dropped and reported as gone.
    pub delete_timeout: u32,

    /// Request timeout for the feed fetch, in seconds. A timed-out
    /// fetch skips the cycle without touching the registry.
    pub fetch_timeout_secs: u64,

    /// Seconds to wait before reconnecting after the chat transport
    /// drops.
    pub reconnect_delay_secs: u64,

    /// Maximum burst of outbound chat messages before the rate limiter
    /// starts delaying sends.
    pub send_burst: u32,

    /// Milliseconds the rate limiter needs to regain one send slot.
    pub send_interval_ms: u64,

    /// Ranking length for `!top` when no count is given.
    pub top_default: usize,

    /// Upper bound on `!top <num>` for in-channel requests. Private
    /// requests are not capped.
    pub top_limit: usize,

    /// Default column count for the `!nodes` listing.
    pub nodes_columns: usize,

    /// Per-category notice switches.
    pub notify: NotifyFlags,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            feed_url: "http://127.0.0.1:8080/nodes.json".into(),
            update_interval_secs: 60,
            delete_timeout: 5,
            fetch_timeout_secs: 10,
            reconnect_delay_secs: 30,
            send_burst: 4,
            send_interval_ms: 1000,
            top_default: 3,
            top_limit: 10,
            nodes_columns: 4,
            notify: NotifyFlags::default(),
        }
    }
}

impl BotConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.feed_url.is_empty() {
            return Err(MeshwatchError::ConfigError {
                reason: "feed_url must not be empty".into(),
            });
        }

        if self.update_interval_secs == 0 {
            return Err(MeshwatchError::ConfigError {
                reason: "update_interval_secs must be greater than 0".into(),
            });
        }

        if self.delete_timeout == 0 {
            return Err(MeshwatchError::ConfigError {
                reason: "delete_timeout must be greater than 0".into(),
            });
        }

        if self.fetch_timeout_secs == 0 {
            return Err(MeshwatchError::ConfigError {
                reason: "fetch_timeout_secs must be greater than 0".into(),
            });
        }

        if self.send_burst == 0 {
            return Err(MeshwatchError::ConfigError {
                reason: "send_burst must be greater than 0".into(),
            });
        }

        if self.send_interval_ms == 0 {
            return Err(MeshwatchError::ConfigError {
                reason: "send_interval_ms must be greater than 0".into(),
            });
        }

        if self.top_default == 0 || self.top_limit == 0 {
            return Err(MeshwatchError::ConfigError {
                reason: "top_default and top_limit must be greater than 0".into(),
            });
        }

        if self.nodes_columns == 0 || self.nodes_columns > 10 {
            return Err(MeshwatchError::ConfigError {
                reason: "nodes_columns must be in 1..=10".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_values() {
        let config = BotConfig::default();
        assert_eq!(config.update_interval_secs, 60);
        assert_eq!(config.delete_timeout, 5);
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.send_burst, 4);
        assert_eq!(config.send_interval_ms, 1000);
        assert_eq!(config.top_default, 3);
        assert_eq!(config.top_limit, 10);
        assert_eq!(config.nodes_columns, 4);
        assert!(config.notify.new_node);
        assert!(config.notify.highscore);
    }

    #[test]
    fn empty_feed_url_rejected() {
        let config = BotConfig {
            feed_url: String::new(),
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_update_interval_rejected() {
        let config = BotConfig {
            update_interval_secs: 0,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_delete_timeout_rejected() {
        let config = BotConfig {
            delete_timeout: 0,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_send_interval_rejected() {
        let config = BotConfig {
            send_interval_ms: 0,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_nodes_columns_rejected() {
        let config = BotConfig {
            nodes_columns: 11,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config: BotConfig =
            serde_json::from_str(r#"{"update_interval_secs": 120, "notify": {"rename": false}}"#)?;
        assert_eq!(config.update_interval_secs, 120);
        assert!(!config.notify.rename);
        assert!(config.notify.new_node);
        assert_eq!(config.delete_timeout, 5);
        Ok(())
    }
}
