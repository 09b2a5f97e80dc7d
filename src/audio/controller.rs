use async_trait::async_trait;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    events::PlaybackEvent,
    filters::{Filter, FilterSettings},
    registry::SessionRegistry,
    session::{LoopMode, SessionDefaults, SessionSnapshot},
    sink::AudioSink,
    track::Track,
    worker::SessionCommand,
};
use crate::error::{PlaybackError, PlaybackResult};
use crate::sources::TrackResolver;

/// Result of a successful enqueue. `position` is the 1-based queue slot, or
/// `0` when the track started playing right away.
#[derive(Debug, Clone, PartialEq)]
pub struct Queued {
    pub position: usize,
    pub track: Track,
}

impl Queued {
    pub fn started(&self) -> bool {
        self.position == 0
    }
}

/// Decides whether a user may apply a filter in a guild.
#[async_trait]
pub trait FilterEntitlement: Send + Sync {
    async fn allows(&self, guild_id: GuildId, user_id: UserId, filter: Filter) -> bool;
}

/// Entitlement check that lets everything through.
pub struct AllowAllFilters;

#[async_trait]
impl FilterEntitlement for AllowAllFilters {
    async fn allows(&self, _guild_id: GuildId, _user_id: UserId, _filter: Filter) -> bool {
        true
    }
}

const EVENT_BUFFER: usize = 256;

/// Entry point for the control surface.
///
/// Every call is routed to the guild's session worker, so operations on one
/// guild are applied in order while different guilds run independently.
pub struct PlaybackController {
    registry: SessionRegistry,
    entitlements: Arc<dyn FilterEntitlement>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        sink: Arc<dyn AudioSink>,
        defaults: SessionDefaults,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            registry: SessionRegistry::new(resolver, sink, events.clone(), defaults),
            entitlements: Arc::new(AllowAllFilters),
            events,
        }
    }

    pub fn with_entitlements(mut self, entitlements: Arc<dyn FilterEntitlement>) -> Self {
        self.entitlements = entitlements;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Lifecycle notifications from every session.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Resolves `query`, queues it and starts playback if the session was idle.
    ///
    /// `voice_channel` is where the requester is connected (`None` when they
    /// are not in voice); `text_channel` receives lifecycle announcements.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        text_channel: Option<ChannelId>,
        query: &str,
        requested_by: UserId,
    ) -> PlaybackResult<Queued> {
        let voice_channel = voice_channel.ok_or(PlaybackError::NotInVoice)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::InvalidArgument("empty query".to_string()));
        }

        let session = self.registry.get_or_create(guild_id);
        session
            .request(|reply| SessionCommand::Enqueue {
                voice_channel,
                text_channel,
                query: query.to_string(),
                requested_by,
                reply,
            })
            .await?
    }

    pub async fn skip(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self
            .registry
            .get(guild_id)
            .ok_or(PlaybackError::NothingPlaying)?;
        let play_id = session.active_play().ok_or(PlaybackError::NothingPlaying)?;

        session
            .request(|reply| SessionCommand::Skip { play_id, reply })
            .await?
    }

    pub async fn pause(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self
            .registry
            .get(guild_id)
            .ok_or(PlaybackError::NothingPlaying)?;
        session
            .request(|reply| SessionCommand::Pause { reply })
            .await?
    }

    pub async fn resume(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self
            .registry
            .get(guild_id)
            .ok_or(PlaybackError::NothingPlaying)?;
        session
            .request(|reply| SessionCommand::Resume { reply })
            .await?
    }

    /// Sets volume from a user percentage (1..=100); returns the stored value.
    pub async fn set_volume(&self, guild_id: GuildId, percent: i64) -> PlaybackResult<f32> {
        if !(1..=100).contains(&percent) {
            return Err(PlaybackError::InvalidArgument(format!(
                "volume must be between 1 and 100, got {percent}"
            )));
        }

        let session = self.registry.get_or_create(guild_id);
        session
            .request(|reply| SessionCommand::SetVolume { percent, reply })
            .await?
    }

    pub async fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> PlaybackResult<()> {
        let session = self.registry.get_or_create(guild_id);
        session
            .request(|reply| SessionCommand::SetLoopMode { mode, reply })
            .await
    }

    /// Stores a filter level for the next track. `intensity` 0 turns it off.
    pub async fn set_filter(
        &self,
        guild_id: GuildId,
        requested_by: UserId,
        name: &str,
        intensity: i64,
    ) -> PlaybackResult<()> {
        let filter: Filter = name.parse()?;
        if !(0..=FilterSettings::MAX_INTENSITY).contains(&intensity) {
            return Err(PlaybackError::InvalidArgument(format!(
                "intensity must be between 0 and {}, got {intensity}",
                FilterSettings::MAX_INTENSITY
            )));
        }
        if !self.entitlements.allows(guild_id, requested_by, filter).await {
            info!("🔒 [{}] {} refused for {}", guild_id, filter, requested_by);
            return Err(PlaybackError::Forbidden(filter.to_string()));
        }

        let session = self.registry.get_or_create(guild_id);
        session
            .request(|reply| SessionCommand::SetFilter {
                filter,
                intensity,
                reply,
            })
            .await?
    }

    /// Shuffles the upcoming tracks; returns how many were shuffled.
    pub async fn shuffle(&self, guild_id: GuildId) -> PlaybackResult<usize> {
        match self.registry.get(guild_id) {
            Some(session) => session.request(|reply| SessionCommand::Shuffle { reply }).await,
            None => Ok(0),
        }
    }

    /// Current state with at most `preview_len` upcoming tracks. Guilds without
    /// a session report defaults.
    pub async fn snapshot(&self, guild_id: GuildId) -> SessionSnapshot {
        let defaults = self.registry.defaults();
        let Some(session) = self.registry.get(guild_id) else {
            return SessionSnapshot::empty(guild_id, defaults);
        };

        session
            .request(|reply| SessionCommand::Snapshot {
                preview_len: defaults.preview_len,
                reply,
            })
            .await
            .unwrap_or_else(|_| SessionSnapshot::empty(guild_id, defaults))
    }

    /// Stops playback, clears the queue, leaves voice and drops the session.
    ///
    /// Anything the session was resolving or connecting is abandoned first.
    pub async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self
            .registry
            .get(guild_id)
            .ok_or(PlaybackError::NotConnected)?;

        session.cancel_pending();
        let result = session
            .request(|reply| SessionCommand::Disconnect { reply })
            .await
            .and_then(|result| result);
        self.registry.remove(&session);

        match result {
            Err(PlaybackError::SessionClosed) => Err(PlaybackError::NotConnected),
            other => other,
        }
    }

    /// Disconnects every session idle for at least `idle_after`.
    ///
    /// The worker re-checks idleness when the request reaches it, so a
    /// command queued in between keeps the session alive. Nothing in flight
    /// is cancelled.
    pub async fn reap_idle(&self, idle_after: Duration) -> usize {
        let idle = self.registry.idle_sessions(idle_after);
        let mut reaped = 0;

        for session in idle {
            let guild_id = session.guild_id();
            match session
                .request(|reply| SessionCommand::Reap { idle_after, reply })
                .await
            {
                Ok(true) | Err(PlaybackError::SessionClosed) => {
                    self.registry.remove(&session);
                    info!("🧹 [{}] Reaped idle session {}", guild_id, session.id());
                    reaped += 1;
                }
                Ok(false) => debug!("[{}] Session {} became busy, kept", guild_id, session.id()),
                Err(e) => warn!("[{}] Could not reap session: {}", guild_id, e),
            }
        }

        reaped
    }

    /// Periodically reaps idle sessions until the controller is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration, idle_after: Duration) -> JoinHandle<()> {
        let controller: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let reaped = controller.reap_idle(idle_after).await;
                if reaped > 0 {
                    debug!("🧹 Reaper removed {} sessions", reaped);
                }
            }
        })
    }

    /// Disconnects every session.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self
            .registry
            .handles()
            .iter()
            .map(|session| session.guild_id())
            .collect();
        info!("⚠️ Closing {} sessions", guilds.len());

        join_all(guilds.into_iter().map(|guild_id| self.disconnect(guild_id))).await;
    }
}
