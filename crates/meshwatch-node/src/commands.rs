//! Command interpreter for inbound chat messages.
//!
//! Stateless query layer: every command is answered synchronously from
//! a single read-locked registry snapshot passed in via
//! [`CommandContext`]. Replies are values — user-level errors ("no such
//! node", "unknown command") are normal responses, never error types.
//!
//! Command surface (text after the `!` prefix): `status [<node>]`,
//! `highscore [<node>]`, `nodes [<cols>]` (private context only),
//! `top [<num>]`, `topic`, `help`.

use meshwatch_store::highscores::{HS_CLIENTS, HS_NODES, HS_NODES_ONLINE};
use meshwatch_store::{HighscoreRecord, HighscoreStore};
use meshwatch_types::config::BotConfig;

use crate::registry::{Node, Registry};

/// Fixed response for anything after `!` that is not a known command.
const UNKNOWN_COMMAND: &str = "Unbekanntes Kommando. !help zeigt alle Kommandos.";

const HELP_TEXT: &str = "Kommandos: !status [Knoten], !highscore [Knoten], \
                         !nodes [Spalten] (nur privat), !top [Anzahl], !topic, !help";

// ---------------------------------------------------------------------------
// CommandContext / CommandReply
// ---------------------------------------------------------------------------

/// Everything a command needs, borrowed for the duration of one
/// read-locked registry access.
pub struct CommandContext<'a> {
    /// The registry, read-locked by the caller.
    pub registry: &'a Registry,
    /// Highscore store for record lookups.
    pub store: &'a HighscoreStore,
    /// Bot configuration (limits, column defaults).
    pub config: &'a BotConfig,
    /// Last known channel topic, if any was observed.
    pub current_topic: Option<&'a str>,
}

/// Result of interpreting one inbound message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandReply {
    /// Notice/privmsg lines back to the requester.
    Lines(Vec<String>),
    /// A topic change for the bot's channel.
    SetTopic(String),
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Interprets one inbound chat message.
///
/// Returns `None` for anything that is not a `!`-prefixed command —
/// ordinary channel chatter is ignored, not answered.
pub fn handle_message(text: &str, private: bool, ctx: &CommandContext) -> Option<CommandReply> {
    let rest = text.trim().strip_prefix('!')?;
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (rest, ""),
    };
    if cmd.is_empty() {
        return None;
    }
    let arg = (!arg.is_empty()).then_some(arg);

    Some(match cmd {
        "status" => status(arg, ctx),
        "highscore" => highscore(arg, ctx),
        "nodes" => nodes_listing(arg, private, ctx),
        "top" => top(arg, private, ctx),
        "topic" => topic(ctx),
        "help" => CommandReply::Lines(vec![HELP_TEXT.into()]),
        _ => CommandReply::Lines(vec![UNKNOWN_COMMAND.into()]),
    })
}

// ---------------------------------------------------------------------------
// !status
// ---------------------------------------------------------------------------

fn status(arg: Option<&str>, ctx: &CommandContext) -> CommandReply {
    let Some(name) = arg else {
        let counters = ctx.registry.counters();
        return CommandReply::Lines(vec![format!(
            "{} Knoten bekannt, {} online, {} Clients",
            counters.nodes, counters.online, counters.clients
        )]);
    };

    let Some(node) = ctx.registry.find(name) else {
        return no_such_node(name);
    };

    let record = node_record(node, ctx.store);
    let mut line = format!(
        "{} ist {}, {} Clients",
        node.name,
        if node.online { "online" } else { "offline" },
        node.clients
    );
    if record.value > 0 {
        line.push_str(&format!(
            " (Rekord: {} am {})",
            record.value,
            record.updated_at.format_short()
        ));
    }
    CommandReply::Lines(vec![line])
}

// ---------------------------------------------------------------------------
// !highscore
// ---------------------------------------------------------------------------

fn highscore(arg: Option<&str>, ctx: &CommandContext) -> CommandReply {
    let Some(name) = arg else {
        let nodes = global_record(ctx.store, HS_NODES);
        let online = global_record(ctx.store, HS_NODES_ONLINE);
        let clients = global_record(ctx.store, HS_CLIENTS);
        return CommandReply::Lines(vec![format!(
            "Highscores: {} Knoten, {} online, {} Clients",
            format_record(&nodes),
            format_record(&online),
            format_record(&clients)
        )]);
    };

    let Some(node) = ctx.registry.find(name) else {
        return no_such_node(name);
    };

    let record = node_record(node, ctx.store);
    let line = if record.value == 0 {
        format!("{} hat noch keinen Highscore.", node.name)
    } else {
        format!(
            "Highscore für {}: {} Clients ({})",
            node.name,
            record.value,
            record.updated_at.format_short()
        )
    };
    CommandReply::Lines(vec![line])
}

// ---------------------------------------------------------------------------
// !nodes
// ---------------------------------------------------------------------------

fn nodes_listing(arg: Option<&str>, private: bool, ctx: &CommandContext) -> CommandReply {
    if !private {
        return CommandReply::Lines(vec![
            "!nodes geht nur per Privatnachricht.".into(),
        ]);
    }

    let columns = match arg {
        None => ctx.config.nodes_columns,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if (1..=10).contains(&n) => n,
            _ => {
                return CommandReply::Lines(vec![format!(
                    "Ungültige Spaltenzahl: {raw} (1-10)"
                )])
            }
        },
    };

    let mut names: Vec<&str> = ctx
        .registry
        .snapshot()
        .values()
        .map(|n| n.name.as_str())
        .collect();
    if names.is_empty() {
        return CommandReply::Lines(vec!["Keine Knoten bekannt.".into()]);
    }
    names.sort_by_key(|n| n.to_lowercase());

    CommandReply::Lines(columnize(&names, columns))
}

/// Lays names out in `columns` columns, padded to the widest name.
pub(crate) fn columnize(names: &[&str], columns: usize) -> Vec<String> {
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);

    names
        .chunks(columns.max(1))
        .map(|chunk| {
            let mut line = String::new();
            for name in chunk {
                line.push_str(name);
                for _ in name.chars().count()..width + 2 {
                    line.push(' ');
                }
            }
            line.trim_end().to_string()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// !top
// ---------------------------------------------------------------------------

fn top(arg: Option<&str>, private: bool, ctx: &CommandContext) -> CommandReply {
    let mut count = match arg {
        None => ctx.config.top_default,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n >= 1 => n,
            _ => return CommandReply::Lines(vec![format!("Ungültige Anzahl: {raw}")]),
        },
    };
    // Public requests are capped so one command cannot flood the channel.
    if !private {
        count = count.min(ctx.config.top_limit);
    }

    let mut nodes: Vec<&Node> = ctx.registry.snapshot().values().collect();
    if nodes.is_empty() {
        return CommandReply::Lines(vec!["Keine Knoten bekannt.".into()]);
    }

    nodes.sort_by(|a, b| b.clients.cmp(&a.clients).then_with(|| a.name.cmp(&b.name)));
    let current: Vec<String> = nodes
        .iter()
        .take(count)
        .map(|n| format!("{} ({})", n.name, n.clients))
        .collect();

    let mut records: Vec<(&Node, u64)> = nodes
        .iter()
        .map(|n| (*n, node_record(n, ctx.store).value))
        .collect();
    records.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));
    let best: Vec<String> = records
        .iter()
        .take(count)
        .map(|(n, v)| format!("{} ({v})", n.name))
        .collect();

    let shown = current.len();
    CommandReply::Lines(vec![
        format!("Top {shown} nach Clients: {}", current.join(", ")),
        format!("Top {shown} nach Rekord: {}", best.join(", ")),
    ])
}

// ---------------------------------------------------------------------------
// !topic
// ---------------------------------------------------------------------------

fn topic(ctx: &CommandContext) -> CommandReply {
    let Some(current) = ctx.current_topic else {
        return CommandReply::Lines(vec!["Kein Topic bekannt.".into()]);
    };

    let counters = ctx.registry.counters();
    let counts = format!(
        "{} Knoten, {} online, {} Clients",
        counters.nodes, counters.online, counters.clients
    );
    CommandReply::SetTopic(rewrite_topic(current, &counts))
}

/// Replaces everything after the last `|` of `current` with `counts`.
///
/// A topic without a separator gets one appended; an empty topic
/// becomes just the counts.
pub(crate) fn rewrite_topic(current: &str, counts: &str) -> String {
    match current.rfind('|') {
        Some(idx) => format!("{}| {counts}", &current[..idx]),
        None if current.is_empty() => counts.to_string(),
        None => format!("{current} | {counts}"),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn no_such_node(name: &str) -> CommandReply {
    CommandReply::Lines(vec![format!("Kein Knoten namens {name} bekannt.")])
}

/// The node's max-clients record: the in-memory cache if the cycle has
/// loaded it, otherwise a direct store read. Store failures degrade to
/// the zero record — a command reply is not worth failing over a
/// storage hiccup.
fn node_record(node: &Node, store: &HighscoreStore) -> HighscoreRecord {
    if let Some(record) = node.max_clients {
        return record;
    }
    store.node(&node.id).unwrap_or_else(|e| {
        tracing::warn!(%e, node = %node.name, "highscore lookup failed");
        HighscoreRecord::zero()
    })
}

fn global_record(store: &HighscoreStore, name: &str) -> HighscoreRecord {
    store.global(name).unwrap_or_else(|e| {
        tracing::warn!(%e, highscore = name, "highscore lookup failed");
        HighscoreRecord::zero()
    })
}

fn format_record(record: &HighscoreRecord) -> String {
    if record.value == 0 {
        "0".into()
    } else {
        format!("{} ({})", record.value, record.updated_at.format_short())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
