//! # Bot Module
//!
//! Discord surface of the jukebox: slash command registration, interaction
//! dispatch and channel announcements.
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. Commands are turned
//! into calls on the shared [`PlaybackController`]; lifecycle events coming
//! back from the sessions are posted to the text channel that last queued a
//! song.
//!
//! ## Example
//!
//! ```rust,no_run
//! use guild_jukebox::bot::JukeboxBot;
//! # fn example(config: std::sync::Arc<guild_jukebox::config::Config>,
//! #            controller: std::sync::Arc<guild_jukebox::audio::PlaybackController>) {
//! let bot = JukeboxBot::new(config, controller);
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    http::Http,
};
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{Filter, FilterEntitlement, PlaybackController, PlaybackEvent},
    config::Config,
    error::PlaybackError,
};

/// Main Discord event handler.
pub struct JukeboxBot {
    config: Arc<Config>,
    pub controller: Arc<PlaybackController>,
    announcer_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, controller: Arc<PlaybackController>) -> Self {
        Self {
            config,
            controller,
            announcer_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands in the configured guild, or globally.
    ///
    /// Guild commands show up within seconds; global ones can take up to an
    /// hour to propagate.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register commands in guild {guild_id}. Check the bot has the 'applications.commands' scope there."
                        )
                    })?;
                info!("✅ Commands registered in guild {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!("Could not register global commands")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// Posts session lifecycle events to their announcement channels.
    fn spawn_announcer(&self, http: Arc<Http>) {
        if self.announcer_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut events = self.controller.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => announce(&http, &event).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!("📢 Announcer fell behind, {} events dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("📢 Announcer stopped");
        });
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Command registration failed: {:?}", e);
        }

        self.spawn_announcer(ctx.http.clone());
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Tears the session down when the bot is removed from voice by someone
    /// else.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        match self.controller.disconnect(guild_id).await {
            Ok(()) => info!("🔌 [{}] Removed from voice, session closed", guild_id),
            Err(PlaybackError::NotConnected) => {}
            Err(e) => warn!("[{}] Cleanup after voice removal failed: {}", guild_id, e),
        }
    }
}

async fn announce(http: &Arc<Http>, event: &PlaybackEvent) {
    let Some(channel) = event.channel() else {
        return;
    };

    if let Err(e) = channel.say(http, announcement_text(event)).await {
        warn!("[{}] Could not announce in {}: {}", event.guild_id(), channel, e);
    }
}

pub(crate) fn announcement_text(event: &PlaybackEvent) -> String {
    match event {
        PlaybackEvent::TrackStarted { track, .. } => match track.duration() {
            Some(duration) => format!(
                "🎵 Now playing: **{}** [{}] (requested by <@{}>)",
                track.title(),
                humantime::format_duration(duration),
                track.requested_by()
            ),
            None => format!(
                "🎵 Now playing: **{}** (requested by <@{}>)",
                track.title(),
                track.requested_by()
            ),
        },
        PlaybackEvent::TrackFailed { track, reason, .. } => {
            format!("⚠️ Skipped **{}**: {}", track.title(), reason)
        }
        PlaybackEvent::QueueFinished { .. } => "📭 Queue finished".to_string(),
        PlaybackEvent::Disconnected { .. } => "👋 Left the voice channel".to_string(),
    }
}

/// Premium filters are limited to a configured set of guilds.
pub struct PremiumGuilds {
    guilds: HashSet<u64>,
}

impl PremiumGuilds {
    pub fn new(guilds: HashSet<u64>) -> Self {
        Self { guilds }
    }
}

#[async_trait]
impl FilterEntitlement for PremiumGuilds {
    async fn allows(&self, guild_id: GuildId, _user_id: UserId, filter: Filter) -> bool {
        !filter.is_premium() || self.guilds.contains(&guild_id.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Track;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn premium_filters_need_a_premium_guild() {
        let premium = PremiumGuilds::new(HashSet::from([1]));
        let user = UserId::new(5);

        assert!(premium.allows(GuildId::new(2), user, Filter::BassBoost).await);
        assert!(!premium.allows(GuildId::new(2), user, Filter::Nightcore).await);
        assert!(premium.allows(GuildId::new(1), user, Filter::Nightcore).await);
    }

    #[test]
    fn announcements() {
        let track = Track::new("Song", "https://video.test/song", UserId::new(7))
            .with_duration(Duration::from_secs(185));
        let started = PlaybackEvent::TrackStarted {
            guild_id: GuildId::new(1),
            channel: None,
            track: track.clone(),
        };
        assert_eq!(
            announcement_text(&started),
            "🎵 Now playing: **Song** [3m 5s] (requested by <@7>)"
        );

        let failed = PlaybackEvent::TrackFailed {
            guild_id: GuildId::new(1),
            channel: None,
            track,
            reason: "stream expired".to_string(),
        };
        assert_eq!(announcement_text(&failed), "⚠️ Skipped **Song**: stream expired");
    }
}
