use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::{ControlError, JoinError},
    input::{File, HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use super::source::{AudioPayload, AudioSource};
use crate::error::TransportError;

/// Sending half of the "track finished" signal. Cloned into every voice
/// event that can end a track; only the first call to [`notify`] counts.
///
/// [`notify`]: FinishNotifier::notify
#[derive(Clone, Default)]
pub struct FinishNotifier {
    sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl FinishNotifier {
    /// Resolves the signal. Returns `false` if it was already resolved.
    pub fn notify(&self) -> bool {
        match self.sender.lock().take() {
            Some(sender) => {
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }
}

/// Receiving half, awaited by the playback loop.
pub struct PlaybackFinished {
    receiver: oneshot::Receiver<()>,
}

impl PlaybackFinished {
    pub async fn wait(self) {
        // A dropped notifier can never fire again, so treat it as finished
        let _ = self.receiver.await;
    }
}

pub fn finish_signal() -> (FinishNotifier, PlaybackFinished) {
    let (sender, receiver) = oneshot::channel();
    (
        FinishNotifier {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        PlaybackFinished { receiver },
    )
}

/// A guild's voice connection as seen by the player.
///
/// Every `play` must eventually call `notify` on the notifier it was given,
/// whether the track ends, fails, or is stopped.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn play(
        &self,
        source: &AudioSource,
        volume: f32,
        finished: FinishNotifier,
    ) -> Result<(), TransportError>;
    fn pause(&self) -> Result<(), TransportError>;
    fn resume(&self) -> Result<(), TransportError>;
    fn stop(&self) -> Result<(), TransportError>;
    fn set_volume(&self, volume: f32) -> Result<(), TransportError>;
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
    async fn is_connected(&self) -> bool;
    fn channel_id(&self) -> Option<ChannelId>;
    fn channel_name(&self) -> Option<String>;
    async fn move_to(&self, channel_id: ChannelId, channel_name: String) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

struct TrackFinishedHandler {
    guild_id: GuildId,
    finished: FinishNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("🔇 Track errored in guild {}: {:?}", self.guild_id, e);
                }
            }
        }

        if self.finished.notify() {
            debug!("Track finished in guild {}", self.guild_id);
        }
        None
    }
}

/// Songbird-backed transport for one guild.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<AsyncMutex<Call>>,
    current: Mutex<Option<TrackHandle>>,
    http: reqwest::Client,
    /// Voice channel the call was last joined to, with its display name.
    channel: Mutex<(ChannelId, String)>,
    connect_timeout: Duration,
}

/// Connects to `channel_id`, or moves there if the guild already has a call.
pub async fn join_channel(
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    channel_name: String,
    connect_timeout: Duration,
    http: reqwest::Client,
) -> Result<SongbirdTransport, TransportError> {
    let call = join_with_timeout(&manager, guild_id, channel_id, &channel_name, connect_timeout).await?;
    info!("🔊 Connected to {} in guild {}", channel_name, guild_id);

    Ok(SongbirdTransport {
        manager,
        guild_id,
        call,
        current: Mutex::new(None),
        http,
        channel: Mutex::new((channel_id, channel_name)),
        connect_timeout,
    })
}

async fn join_with_timeout(
    manager: &Songbird,
    guild_id: GuildId,
    channel_id: ChannelId,
    channel_name: &str,
    connect_timeout: Duration,
) -> Result<Arc<AsyncMutex<Call>>, TransportError> {
    match tokio::time::timeout(connect_timeout, manager.join(guild_id, channel_id)).await {
        Ok(Ok(call)) => Ok(call),
        Ok(Err(JoinError::TimedOut)) | Err(_) => {
            warn!("⏱️ Timed out joining {} in guild {}", channel_name, guild_id);
            Err(TransportError::Timeout(channel_name.to_string()))
        }
        Ok(Err(e)) => Err(TransportError::Join(e.to_string())),
    }
}

impl SongbirdTransport {
    fn input_for(&self, source: &AudioSource) -> Input {
        match source.payload() {
            AudioPayload::File(path) => File::new(path.clone()).into(),
            AudioPayload::Stream(url) => HttpRequest::new(self.http.clone(), url.clone()).into(),
        }
    }

    fn with_current<F>(&self, action: F) -> Result<(), TransportError>
    where
        F: FnOnce(&TrackHandle) -> Result<(), ControlError>,
    {
        match self.current.lock().as_ref() {
            Some(handle) => match action(handle) {
                Ok(()) | Err(ControlError::Finished) => Ok(()),
                Err(e) => Err(TransportError::Driver(e.to_string())),
            },
            None => Ok(()),
        }
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.current.lock().clone()?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn play(
        &self,
        source: &AudioSource,
        volume: f32,
        finished: FinishNotifier,
    ) -> Result<(), TransportError> {
        let input = self.input_for(source);

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_connection().is_none() {
                return Err(TransportError::NotConnected);
            }
            call.play_only_input(input)
        };

        let registered = [TrackEvent::End, TrackEvent::Error]
            .into_iter()
            .try_for_each(|event| {
                handle.add_event(
                    Event::Track(event),
                    TrackFinishedHandler {
                        guild_id: self.guild_id,
                        finished: finished.clone(),
                    },
                )
            });

        if let Err(e) = registered {
            error!("Could not watch track end in guild {}: {}", self.guild_id, e);
            let _ = handle.stop();
            return Err(TransportError::Driver(e.to_string()));
        }

        let _ = handle.set_volume(volume);
        *self.current.lock() = Some(handle);
        debug!("▶️ Playing {} in guild {}", source.track().title(), self.guild_id);
        Ok(())
    }

    fn pause(&self) -> Result<(), TransportError> {
        self.with_current(|h| h.pause())
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.with_current(|h| h.play())
    }

    /// Ends the current track. The End event it raises resolves the notifier.
    fn stop(&self) -> Result<(), TransportError> {
        let handle = self.current.lock().take();
        match handle.map(|h| h.stop()) {
            Some(Err(ControlError::Finished)) | Some(Ok(())) | None => Ok(()),
            Some(Err(e)) => Err(TransportError::Driver(e.to_string())),
        }
    }

    fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        self.with_current(|h| h.set_volume(volume))
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    fn channel_id(&self) -> Option<ChannelId> {
        Some(self.channel.lock().0)
    }

    fn channel_name(&self) -> Option<String> {
        Some(self.channel.lock().1.clone())
    }

    async fn move_to(&self, channel_id: ChannelId, channel_name: String) -> Result<(), TransportError> {
        join_with_timeout(
            &self.manager,
            self.guild_id,
            channel_id,
            &channel_name,
            self.connect_timeout,
        )
        .await?;
        info!("🔀 Moved to {} in guild {}", channel_name, self.guild_id);
        *self.channel.lock() = (channel_id, channel_name);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop()?;
        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => {
                info!("👋 Left voice in guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => Err(TransportError::Driver(e.to_string())),
        }
    }
}
