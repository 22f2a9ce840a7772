//! Channel seams between the core and the chat transport.
//!
//! The core never touches sockets. The transport task (daemon crate)
//! translates protocol lines into [`Inbound`] messages and [`Outbound`]
//! messages into protocol writes, applying the rate limiter before each
//! send. Connection lifecycle — registration, joining the target
//! channel, keepalive, reconnect-after-delay — is owned entirely by the
//! transport; readiness is signalled through a `watch` channel the
//! cycle driver blocks on before its first fetch.

/// Whether a target names a channel rather than a nick.
pub fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Messages from the transport to the core.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Inbound {
    /// A chat message addressed to the bot or its channel.
    Privmsg {
        /// Nickname of the sender.
        from: String,
        /// Where the message was delivered (channel name, or the bot's
        /// own nick for private messages).
        target: String,
        /// Message body.
        text: String,
    },
    /// The channel topic, as announced on join or when changed.
    Topic {
        /// Full topic text.
        text: String,
    },
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages from the core to the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outbound {
    /// A NOTICE, used for announcements and in-channel replies.
    Notice {
        /// Channel or nickname.
        target: String,
        /// Message body.
        text: String,
    },
    /// A PRIVMSG, used for replies to private queries.
    Privmsg {
        /// Nickname of the recipient.
        target: String,
        /// Message body.
        text: String,
    },
    /// A CTCP ACTION ("/me ..."), used for the initialization message.
    Action {
        /// Channel or nickname.
        target: String,
        /// Action body.
        text: String,
    },
    /// A topic change for the bot's channel.
    Topic {
        /// Channel name.
        channel: String,
        /// New full topic text.
        text: String,
    },
}
