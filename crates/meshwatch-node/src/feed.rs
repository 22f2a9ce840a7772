//! Status feed client and record validation.
//!
//! The feed is a JSON document with a `nodes` member mapping node id →
//! node info. Fetch and decode failures abort the whole cycle (the
//! registry stays untouched); a single malformed record only drops that
//! record — the rest of the cycle proceeds, with the skip counted so
//! the cycle can log it.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use meshwatch_types::{MeshwatchError, NodeId, Result};

use crate::registry::FetchedNode;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeedDocument {
    /// node id → node info. Duplicate keys in the raw JSON collapse to
    /// the last occurrence during deserialization.
    nodes: HashMap<String, RawRecord>,
}

/// One record as it appears on the wire, before validation.
///
/// Every field is optional here so a single incomplete record cannot
/// fail the whole document; validation decides per record.
#[derive(Debug, Deserialize)]
struct RawRecord {
    name: Option<String>,
    online: Option<bool>,
    clients: Option<i64>,
}

// ---------------------------------------------------------------------------
// ParsedFeed
// ---------------------------------------------------------------------------

/// Validated cycle input plus the number of records dropped.
#[derive(Debug)]
pub struct ParsedFeed {
    /// Validated records keyed by identifier.
    pub nodes: HashMap<NodeId, FetchedNode>,
    /// Records dropped by validation this cycle.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// FeedClient
// ---------------------------------------------------------------------------

/// HTTP client for the node status feed.
pub struct FeedClient {
    client: reqwest::Client,
    url: String,
}

impl FeedClient {
    /// Builds a client with the given request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeshwatchError::FeedError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, url })
    }

    /// Fetches and validates one cycle's node set.
    ///
    /// # Errors
    ///
    /// [`MeshwatchError::FeedError`] on network failure, timeout, a
    /// non-success status, or an undecodable document. Per-record
    /// validation failures are not errors — they are counted in
    /// [`ParsedFeed::skipped`].
    pub async fn fetch(&self) -> Result<ParsedFeed> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MeshwatchError::FeedError {
                reason: format!("request failed: {e}"),
            })?
            .error_for_status()
            .map_err(|e| MeshwatchError::FeedError {
                reason: format!("feed returned error status: {e}"),
            })?;

        let document: FeedDocument =
            response.json().await.map_err(|e| MeshwatchError::FeedError {
                reason: format!("invalid feed JSON: {e}"),
            })?;

        Ok(parse_document(document))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn parse_document(document: FeedDocument) -> ParsedFeed {
    let mut nodes = HashMap::with_capacity(document.nodes.len());
    let mut skipped = 0;

    for (id, raw) in document.nodes {
        match validate_record(&id, raw) {
            Ok(node) => {
                nodes.insert(node.id.clone(), node);
            }
            Err(e) => {
                skipped += 1;
                tracing::debug!(%e, node = %id, "dropping malformed feed record");
            }
        }
    }

    ParsedFeed { nodes, skipped }
}

fn validate_record(id: &str, raw: RawRecord) -> Result<FetchedNode> {
    if id.is_empty() {
        return Err(MeshwatchError::InvalidRecord {
            reason: "empty node id".into(),
        });
    }

    let name = raw.name.ok_or_else(|| MeshwatchError::InvalidRecord {
        reason: "missing name".into(),
    })?;

    let online = raw.online.ok_or_else(|| MeshwatchError::InvalidRecord {
        reason: "missing online flag".into(),
    })?;

    let clients = match raw.clients {
        Some(n) if n >= 0 => n as u64,
        Some(n) => {
            return Err(MeshwatchError::InvalidRecord {
                reason: format!("negative client count: {n}"),
            })
        }
        None => {
            return Err(MeshwatchError::InvalidRecord {
                reason: "missing client count".into(),
            })
        }
    };

    Ok(FetchedNode {
        id: NodeId::new(id),
        name,
        online,
        clients,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ParsedFeed {
        let document: FeedDocument = serde_json::from_str(json).expect("valid test JSON");
        parse_document(document)
    }

    #[test]
    fn complete_records_pass_validation() {
        let parsed = parse(
            r#"{"nodes": {
                "aa:bb": {"name": "alpha", "online": true, "clients": 4},
                "cc:dd": {"name": "beta", "online": false, "clients": 0}
            }}"#,
        );

        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.nodes.len(), 2);
        let alpha = &parsed.nodes[&NodeId::new("aa:bb")];
        assert_eq!(alpha.name, "alpha");
        assert!(alpha.online);
        assert_eq!(alpha.clients, 4);
    }

    #[test]
    fn missing_required_field_skips_only_that_record() {
        let parsed = parse(
            r#"{"nodes": {
                "aa:bb": {"name": "alpha", "online": true, "clients": 4},
                "cc:dd": {"name": "beta", "clients": 1},
                "ee:ff": {"online": true, "clients": 1}
            }}"#,
        );

        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.nodes.len(), 1);
        assert!(parsed.nodes.contains_key(&NodeId::new("aa:bb")));
    }

    #[test]
    fn negative_client_count_is_rejected() {
        let parsed = parse(r#"{"nodes": {"aa": {"name": "x", "online": true, "clients": -1}}}"#);
        assert_eq!(parsed.skipped, 1);
        assert!(parsed.nodes.is_empty());
    }

    #[test]
    fn duplicate_ids_merge_last_wins() {
        // Duplicate keys in the raw document: the deserializer keeps
        // the last occurrence, silently.
        let parsed = parse(
            r#"{"nodes": {
                "aa": {"name": "first", "online": false, "clients": 1},
                "aa": {"name": "second", "online": true, "clients": 2}
            }}"#,
        );

        assert_eq!(parsed.nodes.len(), 1);
        let node = &parsed.nodes[&NodeId::new("aa")];
        assert_eq!(node.name, "second");
        assert_eq!(node.clients, 2);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let parsed = parse(
            r#"{"nodes": {
                "aa": {"name": "x", "online": true, "clients": 3, "firmware": "1.2.3"}
            }}"#,
        );
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.nodes.len(), 1);
    }
}
