use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    events::PlaybackEvent,
    session::{PlaybackSession, SessionDefaults},
    sink::AudioSink,
    worker::{SessionCommand, SessionStatus, SessionWorker},
};
use crate::error::{PlaybackError, PlaybackResult};
use crate::sources::TrackResolver;

/// Cheap, cloneable address of one session worker.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    guild_id: GuildId,
    mailbox: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
    status: Arc<SessionStatus>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Play id of the stream currently running, if any.
    pub fn active_play(&self) -> Option<u64> {
        self.status.active_play()
    }

    pub fn idle_for(&self) -> Option<Duration> {
        self.status.idle_for()
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Abandons any in-flight connect/resolve/play of this session. Used
    /// right before a disconnect so stale results are never applied.
    pub(crate) fn cancel_pending(&self) {
        self.cancel.cancel();
    }

    /// Sends a command and waits for the worker's reply.
    pub(crate) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> PlaybackResult<T> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .send(build(reply))
            .map_err(|_| PlaybackError::SessionClosed)?;
        response.await.map_err(|_| PlaybackError::SessionClosed)
    }
}

/// Guild → session map. Sessions are created on first use and removed when
/// they disconnect or get reaped.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    resolver: Arc<dyn TrackResolver>,
    sink: Arc<dyn AudioSink>,
    events: broadcast::Sender<PlaybackEvent>,
    defaults: SessionDefaults,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        sink: Arc<dyn AudioSink>,
        events: broadcast::Sender<PlaybackEvent>,
        defaults: SessionDefaults,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            sink,
            events,
            defaults,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn defaults(&self) -> SessionDefaults {
        self.defaults
    }

    /// Returns the guild's session, spawning its worker on first access.
    pub fn get_or_create(&self, guild_id: GuildId) -> SessionHandle {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| self.spawn(guild_id))
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|handle| handle.clone())
    }

    /// Removes `handle`'s entry unless it was already replaced by a newer session.
    pub fn remove(&self, handle: &SessionHandle) -> bool {
        self.sessions
            .remove_if(&handle.guild_id, |_, current| current.id == handle.id)
            .is_some()
    }

    /// Sessions idle for at least `threshold`.
    pub fn idle_sessions(&self, threshold: Duration) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .filter(|entry| entry.idle_for().is_some_and(|idle| idle >= threshold))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn spawn(&self, guild_id: GuildId) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mailbox, commands) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let status = Arc::new(SessionStatus::new());

        let worker = SessionWorker::new(
            id,
            PlaybackSession::new(guild_id, self.defaults),
            self.resolver.clone(),
            self.sink.clone(),
            self.events.clone(),
            mailbox.downgrade(),
            commands,
            cancel.clone(),
            status.clone(),
        );
        tokio::spawn(worker.run());
        debug!("[{}] Created session {}", guild_id, id);

        SessionHandle {
            id,
            guild_id,
            mailbox,
            cancel,
            status,
        }
    }
}
