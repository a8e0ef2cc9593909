use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    player::{GuildPlayer, PlayerMap, PlayerSettings},
    source::AudioSourceProvider,
    transport::VoiceTransport,
};
use crate::{sources::TrackResolver, ui::status::MessageSink};

/// Live players, one per guild.
#[derive(Clone)]
pub struct PlayerRegistry {
    players: Arc<PlayerMap>,
    resolver: Arc<TrackResolver>,
    provider: Arc<dyn AudioSourceProvider>,
    settings: PlayerSettings,
}

impl PlayerRegistry {
    pub fn new(
        resolver: Arc<TrackResolver>,
        provider: Arc<dyn AudioSourceProvider>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            players: Arc::new(DashMap::new()),
            resolver,
            provider,
            settings,
        }
    }

    /// Returns the guild's player, creating it and starting its loop if
    /// there is none. Concurrent callers for one guild get the same player.
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        notices: Arc<dyn MessageSink>,
    ) -> Arc<GuildPlayer> {
        let (player, created) = match self.players.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_destroyed() => (entry.get().clone(), false),
            Entry::Occupied(mut entry) => {
                // Destroyed but not yet deregistered
                let player = self.build(guild_id, transport, notices);
                entry.insert(player.clone());
                (player, true)
            }
            Entry::Vacant(entry) => {
                let player = self.build(guild_id, transport, notices);
                entry.insert(player.clone());
                (player, true)
            }
        };

        // Spawned after the shard lock above is released
        if created {
            info!("🆕 Player created for guild {}", guild_id);
            tokio::spawn(player.clone().run());
        } else {
            debug!("Reusing player for guild {}", guild_id);
        }

        player
    }

    fn build(
        &self,
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        notices: Arc<dyn MessageSink>,
    ) -> Arc<GuildPlayer> {
        Arc::new(GuildPlayer::new(
            guild_id,
            self.settings,
            transport,
            self.provider.clone(),
            self.resolver.clone(),
            notices,
            Arc::downgrade(&self.players),
        ))
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players
            .get(&guild_id)
            .map(|p| p.clone())
            .filter(|p| !p.is_destroyed())
    }

    /// Deregisters the guild's player without tearing it down.
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.remove(&guild_id).map(|(_, player)| player)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Destroys every player.
    pub async fn shutdown(&self) {
        let players: Vec<_> = self.players.iter().map(|p| p.value().clone()).collect();
        info!("🛑 Shutting down {} player(s)", players.len());

        for player in players {
            player.destroy().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockMediaExtractor;
    use crate::testing::{track, FakeTransport, RecordingSink, ScratchProvider};
    use std::time::Duration;

    fn registry() -> PlayerRegistry {
        PlayerRegistry::new(
            Arc::new(TrackResolver::new(Arc::new(MockMediaExtractor::new()), 100)),
            Arc::new(ScratchProvider::new()),
            PlayerSettings::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creation_yields_one_player() {
        let registry = registry();
        let guild = GuildId::new(5);

        let attempts = (0..16).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.get_or_create(
                    guild,
                    Arc::new(FakeTransport::new()),
                    Arc::new(RecordingSink::new()),
                )
            })
        });

        let players: Vec<_> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|p| p.unwrap())
            .collect();

        assert_eq!(registry.len(), 1);
        assert!(players.iter().all(|p| Arc::ptr_eq(p, &players[0])));
    }

    #[tokio::test]
    async fn destroy_deregisters_only_itself() {
        let registry = registry();
        let guild = GuildId::new(5);

        let first = registry.get_or_create(
            guild,
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingSink::new()),
        );
        first.destroy().await;
        assert!(registry.get(guild).is_none());
        assert!(registry.is_empty());

        let second = registry.get_or_create(
            guild,
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingSink::new()),
        );
        assert!(!Arc::ptr_eq(&first, &second));

        // A late second destroy of the old player must not evict the new one
        first.destroy().await;
        assert!(registry.get(guild).is_some());
    }

    #[tokio::test]
    async fn remove_only_deregisters() {
        let registry = registry();
        let guild = GuildId::new(8);
        let player = registry.get_or_create(
            guild,
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingSink::new()),
        );

        let removed = registry.remove(guild).unwrap();
        assert!(Arc::ptr_eq(&player, &removed));
        assert!(registry.get(guild).is_none());
        assert!(!player.is_destroyed());
        assert!(registry.remove(guild).is_none());

        player.destroy().await;
    }

    #[tokio::test]
    async fn shutdown_destroys_every_player() {
        let registry = registry();
        let transports: Vec<_> = (1..=3).map(|_| Arc::new(FakeTransport::new())).collect();

        for (i, transport) in transports.iter().enumerate() {
            let player = registry.get_or_create(
                GuildId::new(i as u64 + 1),
                transport.clone(),
                Arc::new(RecordingSink::new()),
            );
            player.enqueue(vec![track("song")]).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert!(transports.iter().all(|t| t.disconnects() == 1));
    }
}
