//! Persistence for the meshwatch bot.
//!
//! Two concerns live here: the sled-backed highscore store (durable
//! monotonic maxima) and the line-oriented change-log writer whose
//! output feeds the external plotting pipeline.

pub mod changelog;
pub mod highscores;

pub use changelog::ChangeLog;
pub use highscores::{HighscoreRecord, HighscoreStore};
