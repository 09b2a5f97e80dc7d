use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    audio::{LoopMode, SessionSnapshot},
    bot::JukeboxBot,
    error::PlaybackError,
};

/// Dispatches a slash command.
///
/// Every command is deferred first: Discord drops interactions that are not
/// acknowledged within three seconds.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ This command only works in a server")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    command.create_response(&ctx.http, acknowledgement()).await?;

    let content = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "skip" => match bot.controller.skip(guild_id).await {
            Ok(()) => "⏭️ Skipped".to_string(),
            Err(e) => describe_error(&e),
        },
        "pause" => match bot.controller.pause(guild_id).await {
            Ok(()) => "⏸️ Paused".to_string(),
            Err(e) => describe_error(&e),
        },
        "resume" => match bot.controller.resume(guild_id).await {
            Ok(()) => "▶️ Resumed".to_string(),
            Err(e) => describe_error(&e),
        },
        "volume" => {
            let level = integer_option(&command, "level").unwrap_or_default();
            match bot.controller.set_volume(guild_id, level).await {
                Ok(volume) => format!("🔊 Volume set to {}%", (volume * 100.0).round() as u32),
                Err(e) => describe_error(&e),
            }
        }
        "loop" => handle_loop(&command, bot, guild_id).await,
        "filter" => handle_filter(&command, bot, guild_id).await,
        "queue" => render_queue(&bot.controller.snapshot(guild_id).await),
        "shuffle" => match bot.controller.shuffle(guild_id).await {
            Ok(0) => "📭 Nothing to shuffle".to_string(),
            Ok(count) => format!("🔀 Shuffled {count} songs"),
            Err(e) => describe_error(&e),
        },
        "leave" => match bot.controller.disconnect(guild_id).await {
            Ok(()) => "👋 Bye!".to_string(),
            Err(e) => describe_error(&e),
        },
        _ => "❌ Unknown command".to_string(),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

/// Initial "thinking..." response; the real content is edited in afterwards.
fn acknowledgement() -> CreateInteractionResponse {
    CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> String {
    let query = string_option(command, "query").unwrap_or_default();
    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);

    match bot
        .controller
        .enqueue(
            guild_id,
            voice_channel,
            Some(command.channel_id),
            &query,
            command.user.id,
        )
        .await
    {
        Ok(queued) if queued.started() => format!("▶️ Starting **{}**", queued.track.title()),
        Ok(queued) => format!(
            "➕ Queued **{}** at position {}",
            queued.track.title(),
            queued.position
        ),
        Err(e) => describe_error(&e),
    }
}

async fn handle_loop(command: &CommandInteraction, bot: &JukeboxBot, guild_id: GuildId) -> String {
    let mode: LoopMode = match string_option(command, "mode").unwrap_or_default().parse() {
        Ok(mode) => mode,
        Err(e) => return describe_error(&e),
    };

    match bot.controller.set_loop_mode(guild_id, mode).await {
        Ok(()) => match mode {
            LoopMode::Off => "➡️ Loop off".to_string(),
            LoopMode::Single => "🔂 Looping the current song".to_string(),
            LoopMode::Queue => "🔁 Looping the queue".to_string(),
        },
        Err(e) => describe_error(&e),
    }
}

async fn handle_filter(command: &CommandInteraction, bot: &JukeboxBot, guild_id: GuildId) -> String {
    let name = string_option(command, "name").unwrap_or_default();
    let intensity = integer_option(command, "intensity").unwrap_or_default();

    match bot
        .controller
        .set_filter(guild_id, command.user.id, &name, intensity)
        .await
    {
        Ok(()) if intensity == 0 => format!("🎛️ {name} off from the next song"),
        Ok(()) => format!("🎛️ {name} at {intensity}% from the next song"),
        Err(e) => describe_error(&e),
    }
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::to_string)
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// User-facing text for a failed command.
pub(crate) fn describe_error(error: &PlaybackError) -> String {
    match error {
        PlaybackError::NotInVoice => "❌ You need to be in a voice channel".to_string(),
        PlaybackError::NothingPlaying => "❌ Nothing is playing".to_string(),
        PlaybackError::NotConnected => "❌ I'm not in a voice channel".to_string(),
        PlaybackError::NotFound(query) => format!("🔍 No results for `{query}`"),
        PlaybackError::QueueFull(max) => format!("❌ The queue is full ({max} songs)"),
        PlaybackError::Forbidden(filter) => {
            format!("🔒 The {filter} filter is only available on premium servers")
        }
        PlaybackError::InvalidArgument(reason) => format!("❌ {reason}"),
        PlaybackError::Connection(_) => "❌ Could not join your voice channel".to_string(),
        other => format!("❌ Something went wrong: {other}"),
    }
}

/// Current song plus a preview of what comes next.
pub(crate) fn render_queue(snapshot: &SessionSnapshot) -> String {
    let mut lines = Vec::new();

    match &snapshot.current {
        Some(track) => {
            let state = if snapshot.paused { "⏸️" } else { "🎵" };
            lines.push(format!("{state} **{}**", track.title()));
        }
        None => lines.push("Nothing is playing".to_string()),
    }

    if snapshot.upcoming.is_empty() {
        lines.push("📭 The queue is empty".to_string());
    } else {
        for (index, track) in snapshot.upcoming.iter().enumerate() {
            let duration = track
                .duration()
                .map(|d| format!(" [{}]", humantime::format_duration(d)))
                .unwrap_or_default();
            lines.push(format!("{}. {}{}", index + 1, track.title(), duration));
        }
        if snapshot.queued > snapshot.upcoming.len() {
            lines.push(format!("... and {} more", snapshot.queued - snapshot.upcoming.len()));
        }
        lines.push(format!(
            "Total: {} songs, {}",
            snapshot.queued,
            humantime::format_duration(snapshot.total_duration)
        ));
    }

    lines.push(format!(
        "🔊 {}% | loop: {} | filters: {}",
        snapshot.volume_percent(),
        snapshot.loop_mode,
        snapshot.filters.describe()
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SessionDefaults, Track};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn empty_queue_rendering() {
        let snapshot = SessionSnapshot::empty(GuildId::new(1), SessionDefaults::default());
        assert_eq!(
            render_queue(&snapshot),
            "Nothing is playing\n📭 The queue is empty\n🔊 50% | loop: off | filters: none"
        );
    }

    #[test]
    fn queue_rendering_notes_hidden_tracks() {
        let user = UserId::new(3);
        let mut snapshot = SessionSnapshot::empty(GuildId::new(1), SessionDefaults::default());
        snapshot.current = Some(Track::new("Now", "https://video.test/now", user));
        snapshot.upcoming = vec![
            Track::new("Next", "https://video.test/next", user).with_duration(Duration::from_secs(60)),
        ];
        snapshot.queued = 3;
        snapshot.total_duration = Duration::from_secs(60);

        let rendered = render_queue(&snapshot);
        assert!(rendered.starts_with("🎵 **Now**\n1. Next [1m]"));
        assert!(rendered.contains("... and 2 more"));
        assert!(rendered.contains("Total: 3 songs, 1m"));
    }

    #[test]
    fn commands_are_acknowledged_with_a_deferral() {
        assert!(matches!(acknowledgement(), CreateInteractionResponse::Defer(_)));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            describe_error(&PlaybackError::NotFound("abc".to_string())),
            "🔍 No results for `abc`"
        );
        assert_eq!(
            describe_error(&PlaybackError::NotInVoice),
            "❌ You need to be in a voice channel"
        );
    }
}
