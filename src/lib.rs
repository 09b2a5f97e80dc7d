//! # Guild Jukebox
//!
//! Per-guild music playback sessions for Discord.
//!
//! - [`audio`]: sessions, queue, playback state machine and audio sinks
//! - [`sources`]: turning user queries into playable tracks
//! - [`bot`]: slash commands and announcements
//! - [`config`]: environment based configuration

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
