//! meshwatch daemon -- mesh-network status bot.
//!
//! Usage:
//!
//!   meshwatch-daemon <server[:port]> <nickname> <target> [OPTIONS]
//!
//! Options:
//!
//!   --config <PATH>      Bot settings as a JSON config file
//!   --data-dir <PATH>    Data directory (default: ./data)
//!
//! `target` is a channel or a nickname. The daemon polls the
//! configured status feed, announces node changes to the target,
//! answers `!`-commands, and runs until interrupted with Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use meshwatch_node::broadcast::BroadcastSink;
use meshwatch_node::{Bot, BotChannels, RateLimiter};
use meshwatch_store::{ChangeLog, HighscoreStore};

mod config;
mod irc;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const HIGHSCORE_DIR: &str = "highscores";
const CHANGELOG_DIR: &str = "log";
const BROADCAST_FIFO: &str = "broadcast.fifo";

/// Inbound channel capacity. Commands are small and rare; callers see
/// backpressure if the handler falls behind.
const INBOUND_CHANNEL_SIZE: usize = 256;

/// Outbound channel capacity. Absorbs a burst of notices while the
/// rate limiter paces the actual sends.
const OUTBOUND_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Parse CLI arguments (exits with usage on malformed input).
    let cli = config::CliArgs::parse_from_env();

    let daemon_config = match config::DaemonConfig::resolve(cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_daemon(daemon_config).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

async fn run_daemon(cfg: config::DaemonConfig) -> Result<(), String> {
    cfg.bot
        .validate()
        .map_err(|e| format!("invalid configuration: {e}"))?;

    // -----------------------------------------------------------------------
    // 1. Data directory and persistence
    // -----------------------------------------------------------------------

    std::fs::create_dir_all(&cfg.data_dir)
        .map_err(|e| format!("failed to create data directory: {e}"))?;
    tracing::info!(data_dir = %cfg.data_dir.display(), "data directory ready");

    let store = Arc::new(
        HighscoreStore::open(&cfg.data_dir.join(HIGHSCORE_DIR))
            .map_err(|e| format!("failed to open highscore store: {e}"))?,
    );
    let changelog = ChangeLog::open(&cfg.data_dir.join(CHANGELOG_DIR))
        .map_err(|e| format!("failed to open change log: {e}"))?;
    let sink = BroadcastSink::new(cfg.data_dir.join(BROADCAST_FIFO));

    // -----------------------------------------------------------------------
    // 2. Channels between core and transport
    // -----------------------------------------------------------------------

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
    let (ready_tx, ready_rx) = watch::channel(false);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // -----------------------------------------------------------------------
    // 3. Core
    // -----------------------------------------------------------------------

    let mut bot = Bot::new(
        cfg.bot.clone(),
        cfg.target.clone(),
        store.clone(),
        changelog,
        sink,
        BotChannels {
            inbound_rx,
            outbound_tx,
            ready_rx,
        },
    )
    .map_err(|e| format!("bot creation failed: {e}"))?;

    let handles = bot.start().map_err(|e| format!("bot start failed: {e}"))?;
    tracing::info!(feed = %cfg.bot.feed_url, target = %cfg.target, "core started");

    // -----------------------------------------------------------------------
    // 4. Transport
    // -----------------------------------------------------------------------

    let transport = irc::IrcTask {
        config: irc::IrcConfig {
            server: cfg.server.clone(),
            port: cfg.port,
            nickname: cfg.nickname.clone(),
            target: cfg.target.clone(),
            reconnect_delay: Duration::from_secs(cfg.bot.reconnect_delay_secs),
        },
        inbound_tx,
        outbound_rx,
        ready_tx,
        limiter: RateLimiter::new(cfg.bot.send_burst, cfg.bot.send_interval_ms),
        shutdown_rx,
    };
    let mut transport_handle = tokio::spawn(transport.run());

    tracing::info!(
        server = %cfg.server,
        port = cfg.port,
        nickname = %cfg.nickname,
        "transport started"
    );

    // -----------------------------------------------------------------------
    // 5. Wait for shutdown
    // -----------------------------------------------------------------------

    let mut cycle_handle = handles.cycle;
    let mut inbound_handle = handles.inbound;
    let mut cycle_done = false;
    let mut inbound_done = false;
    let mut transport_done = false;
    let mut failure: Option<String> = None;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        result = &mut cycle_handle => {
            cycle_done = true;
            tracing::error!(?result, "cycle driver exited unexpectedly");
        }
        result = &mut inbound_handle => {
            inbound_done = true;
            tracing::error!(?result, "inbound handler exited unexpectedly");
        }
        result = &mut transport_handle => {
            transport_done = true;
            // A transport that gives up before ever connecting is a
            // startup error; anything else already reconnects inside.
            match result {
                Ok(Err(e)) => failure = Some(format!("transport failed: {e}")),
                other => tracing::error!(?other, "transport exited unexpectedly"),
            }
        }
    }

    // Signal everything and give the tasks a moment to drain.
    let _ = shutdown_tx.send(true);
    if let Err(e) = bot.shutdown() {
        tracing::warn!(%e, "bot shutdown");
    }

    let drain = async {
        if !cycle_done {
            let _ = cycle_handle.await;
        }
        if !inbound_done {
            let _ = inbound_handle.await;
        }
        if !transport_done {
            let _ = transport_handle.await;
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(5), drain).await;

    if let Err(e) = store.flush() {
        tracing::warn!(%e, "final highscore flush failed");
    }

    if let Some(reason) = failure {
        return Err(reason);
    }

    tracing::info!("daemon stopped");
    Ok(())
}
