//! # Bot Module
//!
//! Discord front end: slash command registration, interaction dispatch and
//! voice state tracking. Playback itself lives in [`crate::audio`]; this
//! module only connects callers to their guild's [`GuildPlayer`].

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{player::GuildPlayer, registry::PlayerRegistry, transport::join_channel},
    config::Config,
    error::TransportError,
    ui::{channel::DiscordChannel, status::MessageSink},
};

/// Serenity event handler owning the player registry.
pub struct MusicBot {
    config: Arc<Config>,
    pub registry: PlayerRegistry,
    /// Shared client for streamed playback
    http_client: reqwest::Client,
}

impl MusicBot {
    pub fn new(config: Arc<Config>, registry: PlayerRegistry) -> Self {
        Self {
            config,
            registry,
            http_client: reqwest::Client::new(),
        }
    }

    /// Registers slash commands globally, or for `GUILD_ID` during development.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Guild command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register guild commands. Check the bot has 'applications.commands' in the guild."
                    )
                })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register global commands. Check the bot has 'applications.commands'."
                    )
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// Joins `channel_id` and returns the guild's player, creating it if needed.
    ///
    /// Status messages and notices go to `text_channel`.
    pub async fn connect(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
        text_channel: ChannelId,
    ) -> Result<Arc<GuildPlayer>, TransportError> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| TransportError::Join("voice client is not initialised".to_string()))?;

        let channel_name = self.channel_name(ctx, channel_id).await;
        let transport = join_channel(
            manager,
            guild_id,
            channel_id,
            channel_name,
            self.config.connect_timeout,
            self.http_client.clone(),
        )
        .await?;

        Ok(self
            .registry
            .get_or_create(guild_id, Arc::new(transport), self.sink(ctx, text_channel)))
    }

    pub fn sink(&self, ctx: &Context, channel_id: ChannelId) -> Arc<dyn MessageSink> {
        Arc::new(DiscordChannel::new(ctx.http.clone(), channel_id))
    }

    pub async fn channel_name(&self, ctx: &Context, channel_id: ChannelId) -> String {
        channel_id
            .name(ctx)
            .await
            .unwrap_or_else(|_| channel_id.to_string())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Failed to register commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Tears the guild's player down when the bot is kicked from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Our own destroy also lands here, by which point the player is gone
        if let Some(player) = self.registry.get(guild_id) {
            info!("🔌 Disconnected from voice in guild {}", guild_id);
            player.destroy().await;
        }
    }
}
