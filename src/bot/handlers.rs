use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{player::PlaybackChange, transport::VoiceTransport},
    bot::MusicBot,
    error::TransportError,
    sources::Requester,
    ui::embeds,
};

pub const NOT_IN_VOICE: &str = "You are not connected to any voice channel.";
const NOTHING_PLAYING: &str = "I am not currently playing anything!";
const NOT_CONNECTED: &str = "I am not currently connected to voice!";

/// Dispatches slash commands
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside of a server"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        _ => reply_ephemeral(ctx, &command, "❌ Unknown command").await?,
    }

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, NOT_IN_VOICE).await;
    };
    command.defer(&ctx.http).await?;

    let channel_name = bot.channel_name(ctx, channel_id).await;
    let sink = bot.sink(ctx, command.channel_id);

    let outcome = match bot.registry.get(guild_id) {
        Some(player) => {
            if is_current_channel(player.transport().as_ref(), channel_id) {
                return edit(ctx, command, &format!("Already in **{}**", channel_name)).await;
            }
            let moved = player.transport().move_to(channel_id, channel_name.clone()).await;
            moved.map(|_| player)
        }
        None => bot.connect(ctx, guild_id, channel_id, command.channel_id).await,
    };

    match outcome {
        Ok(player) => {
            // Continuity with the old status message is not guaranteed after a move
            if let Err(e) = player.resend_status(sink).await {
                warn!("Could not post status message: {}", e);
            }
            edit(ctx, command, &format!("🔊 Connected to: **{}**", channel_name)).await
        }
        Err(e) => edit(ctx, command, &transport_failure(&e, &channel_name)).await,
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query not provided"))?;

    let queries = split_queries(query);
    if queries.is_empty() {
        return reply_ephemeral(ctx, command, "❌ Tell me what to play").await;
    }

    // Resolution can take a while
    command.defer(&ctx.http).await?;

    let player = match bot.registry.get(guild_id) {
        Some(player) => player,
        None => {
            let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
                return edit(ctx, command, NOT_IN_VOICE).await;
            };
            match bot.connect(ctx, guild_id, channel_id, command.channel_id).await {
                Ok(player) => player,
                Err(e) => {
                    let name = bot.channel_name(ctx, channel_id).await;
                    return edit(ctx, command, &transport_failure(&e, &name)).await;
                }
            }
        }
    };

    if !player.has_status_message().await {
        if let Err(e) = player.resend_status(bot.sink(ctx, command.channel_id)).await {
            warn!("Could not post status message: {}", e);
        }
    }

    let requester = Requester::new(command.user.id, command.user.name.clone());
    let report = match queries.as_slice() {
        [single] => player.enqueue_query(single, &requester).await,
        _ => player.enqueue_batch(queries, &requester).await,
    };

    edit_embed(
        ctx,
        command,
        embeds::tracks_added_embed(report.added, report.failures.len()),
    )
    .await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOTHING_PLAYING).await;
    };

    let change = player.pause().await?;
    reply(ctx, command, &change_reply("⏸️", "Paused", change, &command.user.name)).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOTHING_PLAYING).await;
    };

    let change = player.resume().await?;
    reply(ctx, command, &change_reply("▶️", "Resumed", change, &command.user.name)).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOTHING_PLAYING).await;
    };

    let change = player.skip()?;
    reply(ctx, command, &change_reply("⏭️", "Skipped", change, &command.user.name)).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOT_CONNECTED).await;
    };

    player.destroy().await;
    reply(ctx, command, "⏹️ Stopped, cleared the queue and left the voice channel").await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOT_CONNECTED).await;
    };

    let embed = embeds::queue_embed(player.current().as_ref(), &player.queue_snapshot());
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOT_CONNECTED).await;
    };

    reply_ephemeral(ctx, command, "📌 Player status moved here").await?;
    player
        .resend_status(bot.sink(ctx, command.channel_id))
        .await
        .map_err(|e| anyhow::anyhow!("Could not post status message: {}", e))
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOT_CONNECTED).await;
    };

    let shuffled = player.shuffle().await;
    let text = if shuffled == 0 {
        "There are currently no more queued songs.".to_string()
    } else {
        format!("🔀 **`{}`**: Shuffled {} songs", command.user.name, shuffled)
    };
    reply(ctx, command, &text).await
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.registry.get(guild_id) else {
        return reply(ctx, command, NOT_CONNECTED).await;
    };

    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_f64().or_else(|| opt.value.as_i64().map(|v| v as f64)))
        .ok_or_else(|| anyhow::anyhow!("Volume level not provided"))?;

    match player.set_volume(level) {
        Ok(_) => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new().embed(embeds::volume_embed(level)),
                    ),
                )
                .await?;
            Ok(())
        }
        Err(e) => reply_ephemeral(ctx, command, &e.to_string()).await,
    }
}

// Helpers

/// `a; b ;c` queues three things; blanks are ignored.
pub fn split_queries(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(String::from)
        .collect()
}

fn change_reply(emoji: &str, verb: &str, change: PlaybackChange, user: &str) -> String {
    match change {
        PlaybackChange::Changed => format!("{} **`{}`**: {} the song!", emoji, user, verb),
        PlaybackChange::Unchanged => format!("Nothing to do, the song is already {}.", verb.to_lowercase()),
        PlaybackChange::NothingPlaying => NOTHING_PLAYING.to_string(),
    }
}

/// Compared by id; two voice channels may share a name.
fn is_current_channel(transport: &dyn VoiceTransport, channel_id: ChannelId) -> bool {
    transport.channel_id() == Some(channel_id)
}

fn transport_failure(err: &TransportError, channel: &str) -> String {
    match err {
        TransportError::Timeout(_) => format!("Connecting to channel: <{}> timed out.", channel),
        other => format!("❌ Could not connect to **{}**: {}", channel, other),
    }
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;
    Ok(())
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

async fn edit_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
