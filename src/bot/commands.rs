use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::{Filter, FilterSettings};

/// Registers the commands globally.
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers the commands in a single guild (development).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        volume_command(),
        loop_command(),
        filter_command(),
        queue_command(),
        shuffle_command(),
        leave_command(),
    ]
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song or add it to the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause playback")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume playback")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Stop, clear the queue and leave the voice channel")
}

// Settings

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Set the playback volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume (1-100)")
                .min_int_value(1)
                .max_int_value(100)
                .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Set the loop mode")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Loop mode")
                .add_string_choice("Off", "off")
                .add_string_choice("Current song", "single")
                .add_string_choice("Whole queue", "queue")
                .required(true),
        )
}

fn filter_command() -> CreateCommand {
    let mut name = CreateCommandOption::new(CommandOptionType::String, "name", "Filter")
        .required(true);
    for filter in Filter::ALL {
        name = name.add_string_choice(filter.name(), filter.name());
    }

    CreateCommand::new("filter")
        .description("Set an audio filter for the next songs (0 turns it off)")
        .add_option(name)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "intensity", "Intensity (0-100)")
                .min_int_value(0)
                .max_int_value(FilterSettings::MAX_INTENSITY as u64)
                .required(true),
        )
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current song and the queue")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffle the queue")
}

