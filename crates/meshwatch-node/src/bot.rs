//! Bot lifecycle.
//!
//! [`Bot`] owns all core subsystems and spawns the two tasks of the
//! runtime: the periodic cycle driver and the inbound message handler.
//! Both observe a shared `watch` shutdown channel, so teardown is an
//! explicit signal rather than process exit.
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown
//! ```
//!
//! Double-start and shutdown-before-start are rejected with
//! `MeshwatchError::ConfigError`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use meshwatch_store::{ChangeLog, HighscoreStore};
use meshwatch_types::config::BotConfig;
use meshwatch_types::{MeshwatchError, Result};

use crate::broadcast::BroadcastSink;
use crate::commands::{self, CommandContext, CommandReply};
use crate::cycle::{wait_shutdown, CycleRunner};
use crate::dispatcher::Dispatcher;
use crate::feed::FeedClient;
use crate::registry::Registry;
use crate::transport::{Inbound, Outbound};

// ---------------------------------------------------------------------------
// BotState
// ---------------------------------------------------------------------------

/// Lifecycle state of the bot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BotState {
    /// Components created, tasks not spawned.
    Initializing,
    /// Cycle driver and inbound handler are running.
    Running,
    /// Shutdown signalled.
    ShuttingDown,
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Channel ends connecting the core to the chat transport.
pub struct BotChannels {
    /// Messages from the transport (privmsgs, topic changes).
    pub inbound_rx: mpsc::Receiver<Inbound>,
    /// Messages to the transport (notices, actions, topic writes).
    pub outbound_tx: mpsc::Sender<Outbound>,
    /// True once the transport has registered and joined the target.
    pub ready_rx: watch::Receiver<bool>,
}

/// Handles of the two spawned runtime tasks.
pub struct BotHandles {
    /// The periodic cycle driver.
    pub cycle: JoinHandle<()>,
    /// The inbound message handler.
    pub inbound: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

/// Owned runtime state, moved into the tasks on start.
struct Runtime {
    config: BotConfig,
    target: String,
    registry: Arc<RwLock<Registry>>,
    store: Arc<HighscoreStore>,
    changelog: ChangeLog,
    sink: BroadcastSink,
    channels: BotChannels,
}

/// The meshwatch core: registry, cycle driver, and command handling.
pub struct Bot {
    state: BotState,
    runtime: Option<Runtime>,
    shutdown_tx: watch::Sender<bool>,
}

impl Bot {
    /// Creates a bot reporting to `target` (channel or nick).
    ///
    /// # Errors
    ///
    /// - [`MeshwatchError::ConfigError`] if the configuration fails
    ///   validation.
    pub fn new(
        config: BotConfig,
        target: String,
        store: Arc<HighscoreStore>,
        changelog: ChangeLog,
        sink: BroadcastSink,
        channels: BotChannels,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(RwLock::new(Registry::new(config.delete_timeout)));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            state: BotState::Initializing,
            runtime: Some(Runtime {
                config,
                target,
                registry,
                store,
                changelog,
                sink,
                channels,
            }),
            shutdown_tx,
        })
    }

    /// Spawns the cycle driver and inbound handler tasks.
    ///
    /// # Errors
    ///
    /// - [`MeshwatchError::ConfigError`] on double start.
    /// - [`MeshwatchError::FeedError`] if the HTTP client cannot be
    ///   built.
    pub fn start(&mut self) -> Result<BotHandles> {
        if self.state != BotState::Initializing {
            return Err(MeshwatchError::ConfigError {
                reason: format!("cannot start bot in state {:?}", self.state),
            });
        }
        let runtime = self.runtime.take().ok_or_else(|| MeshwatchError::ConfigError {
            reason: "runtime already consumed (double start?)".into(),
        })?;

        let feed = FeedClient::new(
            runtime.config.feed_url.clone(),
            Duration::from_secs(runtime.config.fetch_timeout_secs),
        )?;

        let dispatcher = Dispatcher::new(
            runtime.config.notify,
            runtime.target.clone(),
            runtime.sink,
            runtime.channels.outbound_tx.clone(),
        );

        let cycle = CycleRunner {
            feed,
            registry: runtime.registry.clone(),
            store: runtime.store.clone(),
            changelog: runtime.changelog,
            dispatcher,
            interval_secs: runtime.config.update_interval_secs,
            ready_rx: runtime.channels.ready_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
        };

        let handler = InboundHandler {
            config: runtime.config,
            target: runtime.target,
            registry: runtime.registry,
            store: runtime.store,
            outbound: runtime.channels.outbound_tx,
            inbound: runtime.channels.inbound_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
            current_topic: None,
        };

        let handles = BotHandles {
            cycle: tokio::spawn(cycle.run()),
            inbound: tokio::spawn(handler.run()),
        };
        self.state = BotState::Running;
        Ok(handles)
    }

    /// Signals both tasks to exit. Idempotent once running.
    ///
    /// # Errors
    ///
    /// - [`MeshwatchError::ConfigError`] if the bot was never started.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == BotState::Initializing {
            return Err(MeshwatchError::ConfigError {
                reason: "cannot shut down a bot that has not been started".into(),
            });
        }
        self.state = BotState::ShuttingDown;
        let _ = self.shutdown_tx.send(true);
        Ok(())
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> BotState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// InboundHandler
// ---------------------------------------------------------------------------

/// Task answering chat commands against registry read locks.
struct InboundHandler {
    config: BotConfig,
    target: String,
    registry: Arc<RwLock<Registry>>,
    store: Arc<HighscoreStore>,
    outbound: mpsc::Sender<Outbound>,
    inbound: mpsc::Receiver<Inbound>,
    shutdown_rx: watch::Receiver<bool>,
    /// Last topic announced by the transport (332 or TOPIC change).
    current_topic: Option<String>,
}

impl InboundHandler {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = wait_shutdown(&mut self.shutdown_rx) => break,
                message = self.inbound.recv() => {
                    match message {
                        None => break,
                        Some(message) => self.handle(message).await,
                    }
                }
            }
        }
        tracing::info!("inbound handler exited");
    }

    async fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Topic { text } => {
                tracing::debug!(topic = %text, "channel topic cached");
                self.current_topic = Some(text);
            }
            Inbound::Privmsg { from, target, text } => {
                self.handle_privmsg(from, target, text).await;
            }
        }
    }

    async fn handle_privmsg(&mut self, from: String, target: String, text: String) {
        let private = !crate::transport::is_channel(&target);

        // The whole reply is produced from one read-locked snapshot;
        // the lock is released before anything is sent.
        let reply = {
            let registry = self.registry.read();
            let ctx = CommandContext {
                registry: &registry,
                store: &self.store,
                config: &self.config,
                current_topic: self.current_topic.as_deref(),
            };
            commands::handle_message(&text, private, &ctx)
        };

        let Some(reply) = reply else { return };
        tracing::debug!(%from, private, command = %text, "answering command");

        match reply {
            CommandReply::Lines(lines) => {
                let reply_target = if private { from } else { target };
                for text in lines {
                    let message = if private {
                        Outbound::Privmsg {
                            target: reply_target.clone(),
                            text,
                        }
                    } else {
                        Outbound::Notice {
                            target: reply_target.clone(),
                            text,
                        }
                    };
                    if self.outbound.send(message).await.is_err() {
                        return;
                    }
                }
            }
            CommandReply::SetTopic(text) => {
                if crate::transport::is_channel(&self.target) {
                    let _ = self
                        .outbound
                        .send(Outbound::Topic {
                            channel: self.target.clone(),
                            text,
                        })
                        .await;
                }
            }
        }
    }
}
