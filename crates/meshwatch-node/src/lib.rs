//! meshwatch core: state reconciliation and notification engine.
//!
//! Orchestrates the polling cycle (fetch → reconcile → dispatch), the
//! command interpreter, and the seams to the chat transport. The
//! daemon crate wires this to an actual IRC connection.

pub mod bot;
pub mod broadcast;
pub mod commands;
mod cycle;
pub mod dispatcher;
pub mod feed;
pub mod rate_limiter;
pub mod registry;
pub mod transport;

pub use bot::{Bot, BotChannels, BotHandles, BotState};
pub use rate_limiter::RateLimiter;
