use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;
use tracing::debug;

use super::filters::FilterSettings;
use super::worker::SessionCommand;
use crate::error::PlaybackResult;

/// A live voice connection handed out by [`AudioSink::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceHandle {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Everything a sink needs to start one stream.
///
/// Filters are a copy taken when the stream starts; later changes to the
/// session never reach a stream already playing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub title: String,
    pub stream_url: String,
    pub volume: f32,
    pub filters: FilterSettings,
}

/// How a stream finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Ended,
    Errored(String),
}

/// One-shot completion signal bound to a single `play` call.
///
/// Carries the owning session, the play it belongs to and the session's
/// mailbox. `notify` consumes the value, so a play can signal at most once;
/// signals for plays the session has moved past are dropped by the worker.
#[derive(Debug)]
pub struct CompletionNotifier {
    guild_id: GuildId,
    session_id: u64,
    play_id: u64,
    mailbox: mpsc::UnboundedSender<SessionCommand>,
}

impl CompletionNotifier {
    pub(crate) fn new(
        guild_id: GuildId,
        session_id: u64,
        play_id: u64,
        mailbox: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            guild_id,
            session_id,
            play_id,
            mailbox,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn play_id(&self) -> u64 {
        self.play_id
    }

    /// Posts the outcome to the session's mailbox.
    pub fn notify(self, outcome: StreamOutcome) {
        let event = SessionCommand::TrackEnded {
            play_id: self.play_id,
            outcome,
        };
        if self.mailbox.send(event).is_err() {
            debug!(
                "[{}] Session {} already closed, dropping completion of play {}",
                self.guild_id, self.session_id, self.play_id
            );
        }
    }
}

/// The audio output pipeline.
///
/// `play` must arrange for the notifier to fire exactly once when the stream
/// ends or errors, and `stop` must make that happen promptly. A failed `play`
/// drops the notifier without firing it.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<VoiceHandle>;

    async fn play(
        &self,
        handle: &VoiceHandle,
        request: PlayRequest,
        on_end: CompletionNotifier,
    ) -> PlaybackResult<()>;

    async fn pause(&self, handle: &VoiceHandle) -> PlaybackResult<()>;

    async fn resume(&self, handle: &VoiceHandle) -> PlaybackResult<()>;

    async fn stop(&self, handle: &VoiceHandle) -> PlaybackResult<()>;

    /// Adjusts the running stream's gain. `Ok(false)` means the sink cannot
    /// do that live and the value applies from the next stream.
    async fn set_volume(&self, _handle: &VoiceHandle, _volume: f32) -> PlaybackResult<bool> {
        Ok(false)
    }

    async fn disconnect(&self, handle: &VoiceHandle) -> PlaybackResult<()>;
}
