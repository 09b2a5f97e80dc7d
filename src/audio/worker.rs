use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    controller::Queued,
    events::PlaybackEvent,
    filters::Filter,
    session::{ConnectionState, LoopMode, PlaybackSession, PlayerState, SessionSnapshot},
    sink::{AudioSink, CompletionNotifier, PlayRequest, StreamOutcome, VoiceHandle},
    track::Track,
};
use crate::error::{PlaybackError, PlaybackResult};
use crate::sources::TrackResolver;

/// Messages processed one at a time by a session's worker.
pub(crate) enum SessionCommand {
    Enqueue {
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
        query: String,
        requested_by: UserId,
        reply: oneshot::Sender<PlaybackResult<Queued>>,
    },
    /// Skip the play the caller saw as active.
    Skip {
        play_id: u64,
        reply: oneshot::Sender<PlaybackResult<()>>,
    },
    Pause {
        reply: oneshot::Sender<PlaybackResult<()>>,
    },
    Resume {
        reply: oneshot::Sender<PlaybackResult<()>>,
    },
    SetVolume {
        percent: i64,
        reply: oneshot::Sender<PlaybackResult<f32>>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: oneshot::Sender<()>,
    },
    SetFilter {
        filter: Filter,
        intensity: i64,
        reply: oneshot::Sender<PlaybackResult<()>>,
    },
    Shuffle {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        preview_len: usize,
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Disconnect {
        reply: oneshot::Sender<PlaybackResult<()>>,
    },
    /// Disconnect only if the session is still idle for `idle_after` once
    /// this message is reached. Replies whether it disconnected.
    Reap {
        idle_after: Duration,
        reply: oneshot::Sender<bool>,
    },
    /// Posted by a [`CompletionNotifier`] when a stream finishes.
    TrackEnded {
        play_id: u64,
        outcome: StreamOutcome,
    },
}

impl SessionCommand {
    /// Read-only commands do not count as activity.
    fn is_activity(&self) -> bool {
        !matches!(self, SessionCommand::Snapshot { .. } | SessionCommand::Reap { .. })
    }
}

/// State shared between a worker and its handles without going through the
/// mailbox.
#[derive(Debug)]
pub(crate) struct SessionStatus {
    /// Play id of the running stream, 0 when none.
    active_play: AtomicU64,
    idle: AtomicBool,
    last_active: Mutex<Instant>,
}

impl SessionStatus {
    pub(crate) fn new() -> Self {
        Self {
            active_play: AtomicU64::new(0),
            idle: AtomicBool::new(true),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn active_play(&self) -> Option<u64> {
        match self.active_play.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// How long the session has been idle, if it is.
    pub(crate) fn idle_for(&self) -> Option<Duration> {
        if self.idle.load(Ordering::Acquire) {
            Some(self.last_active.lock().elapsed())
        } else {
            None
        }
    }
}

pub(crate) struct SessionWorker {
    session_id: u64,
    session: PlaybackSession,
    resolver: Arc<dyn TrackResolver>,
    sink: Arc<dyn AudioSink>,
    events: broadcast::Sender<PlaybackEvent>,
    mailbox: mpsc::WeakUnboundedSender<SessionCommand>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancellationToken,
    status: Arc<SessionStatus>,
    voice: Option<VoiceHandle>,
    active_play: Option<u64>,
    next_play_id: u64,
}

impl SessionWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: u64,
        session: PlaybackSession,
        resolver: Arc<dyn TrackResolver>,
        sink: Arc<dyn AudioSink>,
        events: broadcast::Sender<PlaybackEvent>,
        mailbox: mpsc::WeakUnboundedSender<SessionCommand>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        cancel: CancellationToken,
        status: Arc<SessionStatus>,
    ) -> Self {
        Self {
            session_id,
            session,
            resolver,
            sink,
            events,
            mailbox,
            commands,
            cancel,
            status,
            voice: None,
            active_play: None,
            next_play_id: 1,
        }
    }

    fn guild_id(&self) -> GuildId {
        self.session.guild_id()
    }

    /// Processes commands until disconnected or every sender is gone.
    pub(crate) async fn run(mut self) {
        debug!("🎧 [{}] Session {} started", self.guild_id(), self.session_id);

        while let Some(command) = self.commands.recv().await {
            let activity = command.is_activity();
            if activity {
                self.status.idle.store(false, Ordering::Release);
            }

            let keep_running = self.handle(command).await;
            self.publish_status(activity);
            if !keep_running {
                break;
            }
        }

        debug!("[{}] Session {} stopped", self.guild_id(), self.session_id);
    }

    /// Returns `false` once the session has disconnected.
    async fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Enqueue {
                voice_channel,
                text_channel,
                query,
                requested_by,
                reply,
            } => {
                let result = self
                    .enqueue(voice_channel, text_channel, &query, requested_by)
                    .await;
                let _ = reply.send(result);
            }
            SessionCommand::Skip { play_id, reply } => {
                let result = self.skip(play_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::Pause { reply } => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            SessionCommand::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            SessionCommand::SetVolume { percent, reply } => {
                let result = self.set_volume(percent).await;
                let _ = reply.send(result);
            }
            SessionCommand::SetLoopMode { mode, reply } => {
                self.session.set_loop_mode(mode);
                let _ = reply.send(());
            }
            SessionCommand::SetFilter {
                filter,
                intensity,
                reply,
            } => {
                let _ = reply.send(self.session.set_filter(filter, intensity));
            }
            SessionCommand::Shuffle { reply } => {
                let _ = reply.send(self.session.shuffle());
            }
            SessionCommand::Snapshot { preview_len, reply } => {
                let _ = reply.send(self.session.snapshot(preview_len));
            }
            SessionCommand::Disconnect { reply } => {
                let result = self.disconnect().await;
                let _ = reply.send(result);
                return false;
            }
            SessionCommand::Reap { idle_after, reply } => {
                let reaped = self.reap(idle_after).await;
                let _ = reply.send(reaped);
                return !reaped;
            }
            SessionCommand::TrackEnded { play_id, outcome } => {
                self.on_track_ended(play_id, outcome).await;
            }
        }
        true
    }

    async fn enqueue(
        &mut self,
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
        query: &str,
        requested_by: UserId,
    ) -> PlaybackResult<Queued> {
        if self.session.is_full() {
            return Err(PlaybackError::QueueFull(self.session.max_size()));
        }

        self.ensure_connected(voice_channel).await?;
        self.session.set_announce_channel(text_channel);

        let track = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PlaybackError::SessionClosed),
            resolved = self.resolver.resolve(query, requested_by) => resolved?,
        };

        let position = self.session.enqueue(track.clone())?;
        if self.session.state() != PlayerState::Idle {
            return Ok(Queued { position, track });
        }

        let failure = self.advance().await;
        if self.session.current() == Some(&track) {
            return Ok(Queued { position: 0, track });
        }
        if let Some(position) = self.session.position_of(&track) {
            return Ok(Queued { position, track });
        }

        // dropped while starting
        Err(match failure {
            Some((failed, e)) if failed == track => e,
            _ => PlaybackError::Resolution(format!("{} could not be started", track.title())),
        })
    }

    async fn ensure_connected(&mut self, channel_id: ChannelId) -> PlaybackResult<()> {
        if self.voice.is_some() {
            return Ok(());
        }

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PlaybackError::SessionClosed),
            connected = self.sink.connect(self.session.guild_id(), channel_id) => connected,
        };

        match connected {
            Ok(handle) => {
                info!("🔗 [{}] Connected to voice channel {}", self.guild_id(), channel_id);
                self.voice = Some(handle);
                self.session.set_connection(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                error!("❌ [{}] Voice connection failed: {}", self.guild_id(), e);
                self.session.set_connection(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Starts the next playable track, or idles the session.
    ///
    /// Tracks that fail to resolve or start are dropped and the next one is
    /// tried, at most `queue length + 1` times per call. Returns the last
    /// track dropped on the way, with the reason.
    async fn advance(&mut self) -> Option<(Track, PlaybackError)> {
        self.session.stats_mut().advances += 1;
        self.session.set_state(PlayerState::Advancing);
        self.set_active_play(None);

        if self.voice.is_none() {
            self.session.set_current(None);
            self.session.set_state(PlayerState::Idle);
            return None;
        }

        let mut last_failure = None;
        let mut attempts_left = self.session.len() + 1;
        loop {
            let Some(track) = self.session.dequeue() else {
                self.finish_queue();
                return last_failure;
            };

            match self.start(track.clone()).await {
                Ok(()) => return last_failure,
                Err(PlaybackError::SessionClosed) => {
                    debug!("[{}] Cancelled while starting {}", self.guild_id(), track.title());
                    self.session.set_current(None);
                    return Some((track, PlaybackError::SessionClosed));
                }
                Err(e) => {
                    warn!("⏭️ [{}] Skipping {}: {}", self.guild_id(), track.title(), e);
                    self.session.stats_mut().failed_resolutions += 1;
                    self.session.set_current(None);
                    self.emit(PlaybackEvent::TrackFailed {
                        guild_id: self.guild_id(),
                        channel: self.session.announce_channel(),
                        track: track.clone(),
                        reason: e.to_string(),
                    });
                    last_failure = Some((track, e));

                    attempts_left -= 1;
                    if attempts_left == 0 {
                        warn!("🚫 [{}] Too many failures in a row, going idle", self.guild_id());
                        self.session.set_state(PlayerState::Idle);
                        return last_failure;
                    }
                    self.session.set_state(PlayerState::Advancing);
                }
            }
        }
    }

    async fn start(&mut self, track: Track) -> PlaybackResult<()> {
        let voice = self.voice.ok_or(PlaybackError::NotConnected)?;
        self.session.set_state(PlayerState::Resolving);

        let stream_url = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PlaybackError::SessionClosed),
            stream = self.resolver.resolve_stream(&track) => stream?,
        };

        let play_id = self.next_play_id;
        self.next_play_id += 1;

        let mailbox = self.mailbox.upgrade().ok_or(PlaybackError::SessionClosed)?;
        let notifier = CompletionNotifier::new(self.guild_id(), self.session_id, play_id, mailbox);
        let request = PlayRequest {
            title: track.title().to_string(),
            stream_url,
            volume: self.session.volume(),
            filters: self.session.filters().clone(),
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PlaybackError::SessionClosed),
            played = self.sink.play(&voice, request, notifier) => played?,
        }

        info!("🎵 [{}] Now playing: {}", self.guild_id(), track.title());
        self.session.set_current(Some(track.clone()));
        self.session.set_paused(false);
        self.session.set_state(PlayerState::Playing);
        self.session.stats_mut().tracks_started += 1;
        self.set_active_play(Some(play_id));
        self.emit(PlaybackEvent::TrackStarted {
            guild_id: self.guild_id(),
            channel: self.session.announce_channel(),
            track,
        });
        Ok(())
    }

    fn finish_queue(&mut self) {
        info!("📭 [{}] Queue finished", self.guild_id());
        self.session.set_current(None);
        self.session.set_paused(false);
        self.session.set_state(PlayerState::Idle);
        self.set_active_play(None);
        self.emit(PlaybackEvent::QueueFinished {
            guild_id: self.guild_id(),
            channel: self.session.announce_channel(),
        });
    }

    async fn on_track_ended(&mut self, play_id: u64, outcome: StreamOutcome) {
        if self.active_play != Some(play_id) {
            debug!("[{}] Ignoring stale end of play {}", self.guild_id(), play_id);
            return;
        }

        if let StreamOutcome::Errored(reason) = outcome {
            let error = PlaybackError::SinkPlayback(reason);
            error!("❌ [{}] {}", self.guild_id(), error);
            self.session.stats_mut().stream_errors += 1;
        }

        let _ = self.advance().await;
    }

    async fn skip(&mut self, expected: u64) -> PlaybackResult<()> {
        let (Some(active), Some(voice)) = (self.active_play, self.voice) else {
            return Err(PlaybackError::NothingPlaying);
        };

        if active != expected {
            debug!("[{}] Play {} already ended, skip is a no-op", self.guild_id(), expected);
            return Ok(());
        }

        match self.sink.stop(&voice).await {
            Ok(()) => info!("⏭️ [{}] Skipping current track", self.guild_id()),
            Err(e) => {
                warn!("[{}] Stop failed ({}), advancing directly", self.guild_id(), e);
                let _ = self.advance().await;
            }
        }
        Ok(())
    }

    async fn pause(&mut self) -> PlaybackResult<()> {
        let (Some(_), Some(voice)) = (self.active_play, self.voice) else {
            return Err(PlaybackError::NothingPlaying);
        };
        if !self.session.is_paused() {
            self.sink.pause(&voice).await?;
            self.session.set_paused(true);
            info!("⏸️ [{}] Paused", self.guild_id());
        }
        Ok(())
    }

    async fn resume(&mut self) -> PlaybackResult<()> {
        let (Some(_), Some(voice)) = (self.active_play, self.voice) else {
            return Err(PlaybackError::NothingPlaying);
        };
        if self.session.is_paused() {
            self.sink.resume(&voice).await?;
            self.session.set_paused(false);
            info!("▶️ [{}] Resumed", self.guild_id());
        }
        Ok(())
    }

    async fn set_volume(&mut self, percent: i64) -> PlaybackResult<f32> {
        let volume = self.session.set_volume_percent(percent)?;

        if let (Some(_), Some(voice)) = (self.active_play, self.voice) {
            match self.sink.set_volume(&voice, volume).await {
                Ok(true) => debug!("[{}] Volume applied live", self.guild_id()),
                Ok(false) => debug!("[{}] Volume applies from next track", self.guild_id()),
                Err(e) => warn!("[{}] Live volume change failed: {}", self.guild_id(), e),
            }
        }
        Ok(volume)
    }

    async fn disconnect(&mut self) -> PlaybackResult<()> {
        let voice = self.voice.take();

        self.session.clear();
        self.session.set_connection(ConnectionState::Disconnected);
        self.session.set_state(PlayerState::Idle);
        self.set_active_play(None);

        let Some(voice) = voice else {
            return Err(PlaybackError::NotConnected);
        };

        if let Err(e) = self.sink.disconnect(&voice).await {
            warn!("[{}] Sink disconnect failed: {}", self.guild_id(), e);
        }
        info!("👋 [{}] Disconnected", self.guild_id());
        self.emit(PlaybackEvent::Disconnected {
            guild_id: self.guild_id(),
            channel: self.session.announce_channel(),
        });
        Ok(())
    }

    /// Disconnects if nothing happened for `idle_after`, judged at the point
    /// this message is processed rather than when the reaper looked.
    async fn reap(&mut self, idle_after: Duration) -> bool {
        let still_idle = self.is_idle()
            && self.status.last_active.lock().elapsed() >= idle_after;
        if !still_idle {
            debug!("[{}] Busy again, not reaping", self.guild_id());
            return false;
        }

        match self.disconnect().await {
            Ok(()) | Err(PlaybackError::NotConnected) => {}
            Err(e) => warn!("[{}] Reap disconnect failed: {}", self.guild_id(), e),
        }
        true
    }

    fn is_idle(&self) -> bool {
        self.session.state() == PlayerState::Idle || self.session.is_paused()
    }

    fn set_active_play(&mut self, play_id: Option<u64>) {
        self.active_play = play_id;
        self.status
            .active_play
            .store(play_id.unwrap_or(0), Ordering::Release);
    }

    fn publish_status(&self, activity: bool) {
        if activity {
            *self.status.last_active.lock() = Instant::now();
        }
        self.status.idle.store(self.is_idle(), Ordering::Release);
    }

    fn emit(&self, event: PlaybackEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
