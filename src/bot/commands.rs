use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command the bot answers to.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        volume_command(),
    ]
}

/// Registers global commands
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for one guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Connection

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Connect to your voice channel")
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Request a song, link or playlist and add it to the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Search text, URL or playlist link; separate several with ;",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused song")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback, clear the queue and leave")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the upcoming songs")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Post the player status here")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffle the queued songs")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Change the player volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "level", "Volume from 1 to 100")
                .required(true),
        )
}
