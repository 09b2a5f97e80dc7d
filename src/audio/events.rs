use serenity::model::id::{ChannelId, GuildId};

use super::track::Track;

/// Lifecycle notifications for the control surface to render.
///
/// `channel` is the text channel the session announces to, when one is known.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TrackStarted {
        guild_id: GuildId,
        channel: Option<ChannelId>,
        track: Track,
    },
    /// A queued track was skipped because it could not be played.
    TrackFailed {
        guild_id: GuildId,
        channel: Option<ChannelId>,
        track: Track,
        reason: String,
    },
    QueueFinished {
        guild_id: GuildId,
        channel: Option<ChannelId>,
    },
    Disconnected {
        guild_id: GuildId,
        channel: Option<ChannelId>,
    },
}

impl PlaybackEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            PlaybackEvent::TrackStarted { guild_id, .. }
            | PlaybackEvent::TrackFailed { guild_id, .. }
            | PlaybackEvent::QueueFinished { guild_id, .. }
            | PlaybackEvent::Disconnected { guild_id, .. } => *guild_id,
        }
    }

    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            PlaybackEvent::TrackStarted { channel, .. }
            | PlaybackEvent::TrackFailed { channel, .. }
            | PlaybackEvent::QueueFinished { channel, .. }
            | PlaybackEvent::Disconnected { channel, .. } => *channel,
        }
    }
}
