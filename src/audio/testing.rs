//! In-memory resolver and sink used by the session tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use super::sink::{AudioSink, CompletionNotifier, PlayRequest, StreamOutcome, VoiceHandle};
use super::track::Track;
use crate::error::{PlaybackError, PlaybackResult};
use crate::sources::TrackResolver;

#[derive(Default)]
pub(crate) struct FakeResolver {
    pub missing: Mutex<HashSet<String>>,
    pub broken: Mutex<HashSet<String>>,
    pub fail_all_streams: AtomicBool,
    pub hold_streams: AtomicBool,
    pub stream_calls: AtomicUsize,
    /// Signalled when a held stream lookup starts.
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> PlaybackResult<Track> {
        if self.missing.lock().contains(query) {
            return Err(PlaybackError::NotFound(query.to_string()));
        }
        Ok(Track::new(query, format!("https://video.test/{query}"), requested_by))
    }

    async fn resolve_stream(&self, track: &Track) -> PlaybackResult<String> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);

        if self.hold_streams.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        if self.fail_all_streams.load(Ordering::SeqCst) || self.broken.lock().contains(track.title()) {
            return Err(PlaybackError::Resolution(format!("{} expired", track.title())));
        }
        Ok(format!("https://stream.test/{}", track.title()))
    }
}

#[derive(Default)]
pub(crate) struct FakeSink {
    pub fail_connect: AtomicBool,
    pub fail_stop: AtomicBool,
    pub plays: Mutex<Vec<PlayRequest>>,
    pending: Mutex<Vec<CompletionNotifier>>,
    pub volumes: Mutex<Vec<f32>>,
    pub paused: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FakeSink {
    /// Ends the most recent stream as the pipeline would on its own.
    pub fn finish(&self, outcome: StreamOutcome) -> bool {
        let notifier = self.pending.lock().pop();
        match notifier {
            Some(notifier) => {
                notifier.notify(outcome);
                true
            }
            None => false,
        }
    }

    /// Fires the completion of a specific play, even an old one.
    pub fn finish_play(&self, play_id: u64, outcome: StreamOutcome) -> bool {
        let notifier = {
            let mut pending = self.pending.lock();
            pending
                .iter()
                .position(|n| n.play_id() == play_id)
                .map(|index| pending.remove(index))
        };
        match notifier {
            Some(notifier) => {
                notifier.notify(outcome);
                true
            }
            None => false,
        }
    }

    pub fn played_titles(&self) -> Vec<String> {
        self.plays.lock().iter().map(|p| p.title.clone()).collect()
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<VoiceHandle> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PlaybackError::Connection("missing permissions".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(VoiceHandle {
            guild_id,
            channel_id,
        })
    }

    async fn play(
        &self,
        _handle: &VoiceHandle,
        request: PlayRequest,
        on_end: CompletionNotifier,
    ) -> PlaybackResult<()> {
        self.plays.lock().push(request);
        self.pending.lock().push(on_end);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self, _handle: &VoiceHandle) -> PlaybackResult<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self, _handle: &VoiceHandle) -> PlaybackResult<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _handle: &VoiceHandle) -> PlaybackResult<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(PlaybackError::SinkPlayback("track handle gone".to_string()));
        }
        self.finish(StreamOutcome::Ended);
        Ok(())
    }

    async fn set_volume(&self, _handle: &VoiceHandle, volume: f32) -> PlaybackResult<bool> {
        self.volumes.lock().push(volume);
        Ok(true)
    }

    async fn disconnect(&self, _handle: &VoiceHandle) -> PlaybackResult<()> {
        self.pending.lock().clear();
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
