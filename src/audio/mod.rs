//! # Audio Module
//!
//! Per-guild playback sessions and the state machine that drives them.
//!
//! ## Architecture
//!
//! ### [`controller`] - Playback Controller
//! - Public entry point used by the bot commands
//! - Validates input and routes each call to the guild's session
//! - Reaps idle sessions
//!
//! ### [`registry`] - Session Registry
//! - Guild → session map, sessions created on first use
//! - Every session runs on its own worker task, so one guild's slow
//!   resolution never blocks another guild
//!
//! ### [`session`] - Queue and Session State
//! - FIFO queue with `off` / `single` / `queue` loop modes
//! - Volume, filters, connection and player state
//!
//! ### [`sink`] - Audio Output
//! - [`sink::AudioSink`] abstracts the voice pipeline
//! - [`songbird_sink::SongbirdSink`] is the Discord implementation
//!
//! ## Ordering
//!
//! Commands for one guild are applied strictly in arrival order. Each play
//! gets an id; completion signals and skips name the play they refer to, so
//! a track that is skipped while it ends on its own advances the queue once.

pub mod controller;
pub mod events;
pub mod filters;
pub mod registry;
pub mod session;
pub mod sink;
pub mod songbird_sink;
pub mod track;
pub(crate) mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{AllowAllFilters, FilterEntitlement, PlaybackController, Queued};
pub use events::PlaybackEvent;
pub use filters::{Filter, FilterSettings};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{
    ConnectionState, LoopMode, PlaybackSession, PlayerState, SessionDefaults, SessionSnapshot,
    SessionStats,
};
pub use sink::{AudioSink, CompletionNotifier, PlayRequest, StreamOutcome, VoiceHandle};
pub use songbird_sink::SongbirdSink;
pub use track::Track;
