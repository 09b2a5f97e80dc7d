use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, Track, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::sink::{AudioSink, CompletionNotifier, PlayRequest, StreamOutcome, VoiceHandle};
use crate::error::{PlaybackError, PlaybackResult};

/// [`AudioSink`] backed by songbird's voice driver.
///
/// Filters are recorded on each stream start but not rendered: the driver
/// plays the remote stream as is.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            tracks: DashMap::new(),
        }
    }

    fn track(&self, guild_id: GuildId) -> PlaybackResult<TrackHandle> {
        self.tracks
            .get(&guild_id)
            .map(|handle| handle.clone())
            .ok_or(PlaybackError::NothingPlaying)
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<VoiceHandle> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(_call) => {
                info!("🔊 [{}] Joined voice channel {}", guild_id, channel_id);
                Ok(VoiceHandle {
                    guild_id,
                    channel_id,
                })
            }
            Err(e) => Err(PlaybackError::Connection(e.to_string())),
        }
    }

    async fn play(
        &self,
        handle: &VoiceHandle,
        request: PlayRequest,
        on_end: CompletionNotifier,
    ) -> PlaybackResult<()> {
        let call = self
            .manager
            .get(handle.guild_id)
            .ok_or(PlaybackError::NotConnected)?;

        if !request.filters.is_empty() {
            debug!(
                "[{}] Filters for {}: {} (passthrough)",
                handle.guild_id,
                request.title,
                request.filters.describe()
            );
        }

        let input: Input = HttpRequest::new(self.http.clone(), request.stream_url).into();
        let track = {
            let mut call = call.lock().await;
            call.stop();
            call.play(prepare_track(input, request.volume))
        };

        let notifier = Arc::new(Mutex::new(Some(on_end)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            track
                .add_event(
                    Event::Track(event),
                    StreamEndHandler {
                        notifier: notifier.clone(),
                    },
                )
                .map_err(|e| PlaybackError::SinkPlayback(e.to_string()))?;
        }

        self.tracks.insert(handle.guild_id, track);
        Ok(())
    }

    async fn pause(&self, handle: &VoiceHandle) -> PlaybackResult<()> {
        self.track(handle.guild_id)?
            .pause()
            .map_err(|e| PlaybackError::SinkPlayback(e.to_string()))
    }

    async fn resume(&self, handle: &VoiceHandle) -> PlaybackResult<()> {
        self.track(handle.guild_id)?
            .play()
            .map_err(|e| PlaybackError::SinkPlayback(e.to_string()))
    }

    async fn stop(&self, handle: &VoiceHandle) -> PlaybackResult<()> {
        let (_, track) = self
            .tracks
            .remove(&handle.guild_id)
            .ok_or(PlaybackError::NothingPlaying)?;
        track
            .stop()
            .map_err(|e| PlaybackError::SinkPlayback(e.to_string()))
    }

    async fn set_volume(&self, handle: &VoiceHandle, volume: f32) -> PlaybackResult<bool> {
        self.track(handle.guild_id)?
            .set_volume(volume)
            .map_err(|e| PlaybackError::SinkPlayback(e.to_string()))?;
        Ok(true)
    }

    async fn disconnect(&self, handle: &VoiceHandle) -> PlaybackResult<()> {
        if let Some((_, track)) = self.tracks.remove(&handle.guild_id) {
            if let Err(e) = track.stop() {
                warn!("[{}] Could not stop stream before leaving: {}", handle.guild_id, e);
            }
        }
        self.manager
            .remove(handle.guild_id)
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        info!("👋 [{}] Left voice channel {}", handle.guild_id, handle.channel_id);
        Ok(())
    }
}

/// Volume is part of the track so the first frames already play at it.
fn prepare_track(input: Input, volume: f32) -> Track {
    Track::new(input).volume(volume)
}

/// Fires the play's notifier on whichever of end/error arrives first.
struct StreamEndHandler {
    notifier: Arc<Mutex<Option<CompletionNotifier>>>,
}

#[async_trait]
impl VoiceEventHandler for StreamEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let Some(notifier) = self.notifier.lock().take() else {
            return None;
        };

        let mut outcome = StreamOutcome::Ended;
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                if let PlayMode::Errored(e) = &state.playing {
                    outcome = StreamOutcome::Errored(format!("{e:?}"));
                }
            }
        }

        debug!("[{}] Stream of play {} finished: {:?}", notifier.guild_id(), notifier.play_id(), outcome);
        notifier.notify(outcome);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn streams_start_at_the_requested_volume() {
        let input: Input =
            HttpRequest::new(reqwest::Client::new(), "https://stream.test/a".to_string()).into();
        let track = prepare_track(input, 0.3);
        assert_eq!(track.volume, 0.3);
    }
}
