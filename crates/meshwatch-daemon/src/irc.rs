//! IRC transport task.
//!
//! Owns the TCP connection and translates between protocol lines and
//! the core's channel seams. Registration (NICK/USER), joining the
//! target channel, and PING keepalive are handled here; the core never
//! sees protocol text. Every outbound send waits on the rate limiter
//! first.
//!
//! A dropped connection flips the ready flag to false and reconnects
//! after a fixed delay; the process keeps running.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use meshwatch_node::transport::{is_channel, Inbound, Outbound};
use meshwatch_node::RateLimiter;
use meshwatch_types::{MeshwatchError, Result};

// ---------------------------------------------------------------------------
// IrcConfig / IrcTask
// ---------------------------------------------------------------------------

/// Endpoint and identity of the IRC connection.
pub struct IrcConfig {
    pub server: String,
    pub port: u16,
    pub nickname: String,
    /// Channel to join, or a nickname for query-only operation.
    pub target: String,
    pub reconnect_delay: Duration,
}

/// The transport task. Spawn with [`IrcTask::run`].
pub struct IrcTask {
    pub config: IrcConfig,
    pub inbound_tx: mpsc::Sender<Inbound>,
    pub outbound_rx: mpsc::Receiver<Outbound>,
    pub ready_tx: watch::Sender<bool>,
    pub limiter: RateLimiter,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Why a session ended.
enum SessionEnd {
    /// Shutdown was signalled; no reconnect.
    Shutdown,
    /// The core hung up its channels; no reconnect.
    CoreGone,
}

impl IrcTask {
    /// Connects, runs, reconnects after a delay when an established
    /// connection drops. Returns when shutdown is signalled or the
    /// core goes away.
    ///
    /// # Errors
    ///
    /// A failure of the *initial* connection attempt is a startup
    /// error and returned to the caller (the daemon exits non-zero);
    /// everything after that falls under the reconnect policy.
    pub async fn run(mut self) -> Result<()> {
        let mut first_attempt = true;

        loop {
            let stream = match self.connect().await {
                Ok(stream) => stream,
                Err(e) if first_attempt => return Err(e),
                Err(e) => {
                    tracing::warn!(%e, "reconnect attempt failed");
                    if !self.pause_before_reconnect().await {
                        break;
                    }
                    continue;
                }
            };
            first_attempt = false;

            match self.session(stream).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::CoreGone) => {
                    tracing::info!("core channels closed, transport exiting");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%e, "connection lost");
                }
            }

            let _ = self.ready_tx.send(false);
            if !self.pause_before_reconnect().await {
                break;
            }
        }

        let _ = self.ready_tx.send(false);
        tracing::info!("transport exited");
        Ok(())
    }

    async fn connect(&self) -> Result<TcpStream> {
        tracing::info!(
            server = %self.config.server,
            port = self.config.port,
            "connecting"
        );

        TcpStream::connect((self.config.server.as_str(), self.config.port))
            .await
            .map_err(|e| MeshwatchError::TransportError {
                reason: format!("connect failed: {e}"),
            })
    }

    /// Sleeps the reconnect delay. Returns `false` when shutdown was
    /// signalled instead.
    async fn pause_before_reconnect(&mut self) -> bool {
        if *self.shutdown_rx.borrow() {
            return false;
        }
        tracing::info!(
            delay_secs = self.config.reconnect_delay.as_secs(),
            "reconnecting after delay"
        );
        tokio::select! {
            _ = tokio::time::sleep(self.config.reconnect_delay) => true,
            _ = shutdown_signalled(&mut self.shutdown_rx) => false,
        }
    }

    /// One connection lifetime: register, then multiplex protocol
    /// lines, outbound messages and the shutdown signal.
    async fn session(&mut self, stream: TcpStream) -> Result<SessionEnd> {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half).lines();

        // Register.
        write_line(&mut writer, &format!("NICK {}", self.config.nickname)).await?;
        write_line(
            &mut writer,
            &format!("USER {} 0 * :meshwatch", self.config.nickname),
        )
        .await?;

        loop {
            tokio::select! {
                line = reader.next_line() => {
                    let line = line.map_err(|e| MeshwatchError::TransportError {
                        reason: format!("read failed: {e}"),
                    })?;
                    let Some(line) = line else {
                        return Err(MeshwatchError::TransportError {
                            reason: "connection closed by server".into(),
                        });
                    };
                    if self.handle_line(line.trim_end(), &mut writer).await? {
                        continue;
                    }
                    return Ok(SessionEnd::CoreGone);
                }

                outbound = self.outbound_rx.recv() => {
                    let Some(message) = outbound else {
                        return Ok(SessionEnd::CoreGone);
                    };
                    self.limiter.acquire().await;
                    write_line(&mut writer, &render(&message)).await?;
                }

                _ = shutdown_signalled(&mut self.shutdown_rx) => {
                    let _ = write_line(&mut writer, "QUIT :shutting down").await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    /// Processes one protocol line. Returns `false` once the core's
    /// inbound channel is gone.
    async fn handle_line(&mut self, raw: &str, writer: &mut OwnedWriteHalf) -> Result<bool> {
        let Some(line) = parse_line(raw) else {
            return Ok(true);
        };

        match line.command {
            "PING" => {
                let token = line.trailing.or_else(|| line.params.first().copied());
                write_line(writer, &format!("PONG :{}", token.unwrap_or(""))).await?;
            }

            // Welcome: join the channel, or go ready immediately for a
            // query-only target.
            "001" => {
                tracing::info!("registered with server");
                if is_channel(&self.config.target) {
                    write_line(writer, &format!("JOIN {}", self.config.target)).await?;
                } else {
                    let _ = self.ready_tx.send(true);
                }
            }

            // Nick collision during registration: retry with a suffix.
            "433" => {
                self.config.nickname.push('_');
                tracing::warn!(nickname = %self.config.nickname, "nick in use, retrying");
                write_line(writer, &format!("NICK {}", self.config.nickname)).await?;
            }

            "JOIN" => {
                let joined = line
                    .trailing
                    .or_else(|| line.params.first().copied())
                    .unwrap_or("");
                if nick_of(line.prefix) == Some(self.config.nickname.as_str())
                    && joined == self.config.target
                {
                    tracing::info!(channel = %self.config.target, "joined");
                    let _ = self.ready_tx.send(true);
                }
            }

            // Topic on join (332) or live topic change.
            "332" => {
                if let Some(text) = line.trailing {
                    if self.forward(Inbound::Topic { text: text.into() }).await.is_err() {
                        return Ok(false);
                    }
                }
            }
            "TOPIC" => {
                if let Some(text) = line.trailing {
                    if self.forward(Inbound::Topic { text: text.into() }).await.is_err() {
                        return Ok(false);
                    }
                }
            }

            "PRIVMSG" => {
                let (Some(from), Some(target), Some(text)) = (
                    nick_of(line.prefix),
                    line.params.first().copied(),
                    line.trailing,
                ) else {
                    return Ok(true);
                };
                let message = Inbound::Privmsg {
                    from: from.to_string(),
                    target: target.to_string(),
                    text: text.to_string(),
                };
                if self.forward(message).await.is_err() {
                    return Ok(false);
                }
            }

            _ => {}
        }

        Ok(true)
    }

    async fn forward(&self, message: Inbound) -> std::result::Result<(), ()> {
        self.inbound_tx.send(message).await.map_err(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    writer
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .map_err(|e| MeshwatchError::TransportError {
            reason: format!("write failed: {e}"),
        })
}

/// Renders an outbound message as a protocol line.
fn render(message: &Outbound) -> String {
    match message {
        Outbound::Notice { target, text } => format!("NOTICE {target} :{text}"),
        Outbound::Privmsg { target, text } => format!("PRIVMSG {target} :{text}"),
        Outbound::Action { target, text } => {
            format!("PRIVMSG {target} :\u{1}ACTION {text}\u{1}")
        }
        Outbound::Topic { channel, text } => format!("TOPIC {channel} :{text}"),
    }
}

/// One parsed protocol line.
struct Line<'a> {
    prefix: Option<&'a str>,
    command: &'a str,
    params: Vec<&'a str>,
    trailing: Option<&'a str>,
}

/// Splits `[:prefix] COMMAND param* [:trailing]`.
fn parse_line(raw: &str) -> Option<Line<'_>> {
    let mut rest = raw;

    let prefix = if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix, tail) = stripped.split_once(' ')?;
        rest = tail;
        Some(prefix)
    } else {
        None
    };

    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (rest, None),
    };

    let mut words = head.split_ascii_whitespace();
    let command = words.next()?;
    let params: Vec<&str> = words.collect();

    Some(Line {
        prefix,
        command,
        params,
        trailing,
    })
}

/// The nick part of a `nick!user@host` prefix.
fn nick_of(prefix: Option<&str>) -> Option<&str> {
    let prefix = prefix?;
    Some(prefix.split('!').next().unwrap_or(prefix))
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
