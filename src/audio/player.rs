use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::{
    queue::{Dequeued, TrackQueue},
    source::AudioSourceProvider,
    transport::{finish_signal, VoiceTransport},
};
use crate::{
    config::Config,
    error::{ConfigurationError, DisplayError, ResolutionError, TransportError},
    sources::{Requester, Track, TrackResolver},
    ui::status::{MessageSink, StatusDisplay},
};

pub(crate) type PlayerMap = DashMap<GuildId, Arc<GuildPlayer>>;

/// The slice of [`Config`] a player needs.
#[derive(Debug, Clone, Copy)]
pub struct PlayerSettings {
    pub default_volume: f32,
    pub idle_timeout: Duration,
    pub max_transport_failures: u32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            idle_timeout: Duration::from_secs(300),
            max_transport_failures: 3,
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            idle_timeout: config.idle_timeout,
            max_transport_failures: config.max_transport_failures,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Connected, between tracks.
    Waiting,
    Playing,
    Paused,
    /// Terminal.
    Destroyed,
}

/// Outcome of pause / resume / skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackChange {
    Changed,
    /// Already in the requested state.
    Unchanged,
    NothingPlaying,
}

#[derive(Debug, Default)]
pub struct EnqueueReport {
    pub added: usize,
    pub failures: Vec<ResolutionError>,
}

/// Playback state of one guild plus the loop that drives it.
pub struct GuildPlayer {
    guild_id: GuildId,
    settings: PlayerSettings,
    queue: TrackQueue,
    current: Mutex<Option<Track>>,
    state: Mutex<PlayerState>,
    volume: Mutex<f32>,
    transport: Arc<dyn VoiceTransport>,
    provider: Arc<dyn AudioSourceProvider>,
    resolver: Arc<TrackResolver>,
    display: AsyncMutex<StatusDisplay>,
    notices: Mutex<Arc<dyn MessageSink>>,
    registry: Weak<PlayerMap>,
    destroyed: AtomicBool,
    running: AtomicBool,
}

impl GuildPlayer {
    pub(crate) fn new(
        guild_id: GuildId,
        settings: PlayerSettings,
        transport: Arc<dyn VoiceTransport>,
        provider: Arc<dyn AudioSourceProvider>,
        resolver: Arc<TrackResolver>,
        notices: Arc<dyn MessageSink>,
        registry: Weak<PlayerMap>,
    ) -> Self {
        Self {
            guild_id,
            settings,
            queue: TrackQueue::new(),
            current: Mutex::new(None),
            state: Mutex::new(PlayerState::Waiting),
            volume: Mutex::new(settings.default_volume.clamp(0.0, 1.0)),
            transport,
            provider,
            resolver,
            display: AsyncMutex::new(StatusDisplay::new()),
            notices: Mutex::new(notices),
            registry,
            destroyed: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Plays queued tracks one after another until the player is destroyed.
    pub async fn run(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Playback loop for guild {} is already running", self.guild_id);
            return;
        }

        info!("🎶 Playback loop started for guild {}", self.guild_id);
        let mut transport_failures = 0u32;

        loop {
            let (notifier, finished) = finish_signal();

            let track = match self.queue.pop(self.settings.idle_timeout).await {
                Dequeued::Track(track) => track,
                Dequeued::TimedOut => {
                    info!(
                        "💤 Guild {} idle for {:?}, disconnecting",
                        self.guild_id, self.settings.idle_timeout
                    );
                    self.destroy().await;
                    break;
                }
                Dequeued::Closed => break,
            };

            if !self.transport.is_connected().await {
                transport_failures += 1;
                warn!(
                    "No voice connection in guild {} ({}/{}), dropping {}",
                    self.guild_id,
                    transport_failures,
                    self.settings.max_transport_failures,
                    track.title()
                );
                if transport_failures >= self.settings.max_transport_failures {
                    self.destroy().await;
                    break;
                }
                continue;
            }

            let source = match self.provider.acquire(self.guild_id, &track).await {
                Ok(source) => source,
                Err(e) => {
                    warn!("❌ Could not acquire {}: {}", track.title(), e);
                    self.notify(&format!(
                        "There was an error processing your song.\n```css\n[{}]\n```",
                        e
                    ))
                    .await;
                    continue;
                }
            };

            if self.is_destroyed() {
                source.release().await;
                break;
            }

            let volume = *self.volume.lock();

            if let Err(e) = self.transport.play(&source, volume, notifier).await {
                error!("Failed to play {} in guild {}: {}", track.title(), self.guild_id, e);
                source.release().await;
                transport_failures += 1;
                if transport_failures >= self.settings.max_transport_failures {
                    self.destroy().await;
                    break;
                }
                continue;
            }
            transport_failures = 0;
            // Only once the transport holds the track, so a skip always has something to stop
            *self.current.lock() = Some(source.track().clone());

            if self.is_destroyed() {
                // Destroyed between the check above and play; make sure it ends
                if let Err(e) = self.transport.stop() {
                    warn!("Failed to stop playback in guild {}: {}", self.guild_id, e);
                }
            }

            info!("🎵 Now playing in guild {}: {}", self.guild_id, source.track());
            self.set_state(PlayerState::Playing);
            self.refresh_status().await;

            finished.wait().await;

            source.release().await;
            *self.current.lock() = None;

            if self.is_destroyed() {
                break;
            }
            self.set_state(PlayerState::Waiting);
            self.refresh_status().await;
        }

        info!("🏁 Playback loop ended for guild {}", self.guild_id);
    }

    /// Appends tracks in order and refreshes the status message.
    pub async fn enqueue(&self, tracks: Vec<Track>) -> usize {
        let added = self.queue.extend(tracks);
        if added > 0 {
            self.refresh_status().await;
        }
        added
    }

    /// Resolves `query` and queues whatever resolved. Failures are posted to
    /// the notice channel and returned.
    pub async fn enqueue_query(&self, query: &str, requester: &Requester) -> EnqueueReport {
        let resolved = self.resolver.resolve(query, requester).await;
        let added = self.enqueue(resolved.tracks).await;
        self.report_failures(&resolved.failures).await;

        EnqueueReport {
            added,
            failures: resolved.failures,
        }
    }

    /// Resolves several queries concurrently, queueing each result as soon
    /// as it completes.
    pub async fn enqueue_batch(&self, queries: Vec<String>, requester: &Requester) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        let results = self.resolver.resolve_batch(queries, requester);
        tokio::pin!(results);

        while let Some(resolved) = results.next().await {
            report.added += self.enqueue(resolved.tracks).await;
            self.report_failures(&resolved.failures).await;
            report.failures.extend(resolved.failures);
        }

        report
    }

    pub async fn pause(&self) -> Result<PlaybackChange, TransportError> {
        if self.transport.is_paused().await {
            return Ok(PlaybackChange::Unchanged);
        }
        if !self.transport.is_playing().await {
            return Ok(PlaybackChange::NothingPlaying);
        }

        self.transport.pause()?;
        self.set_state(PlayerState::Paused);
        info!("⏸️ Paused in guild {}", self.guild_id);
        Ok(PlaybackChange::Changed)
    }

    pub async fn resume(&self) -> Result<PlaybackChange, TransportError> {
        if self.transport.is_playing().await {
            return Ok(PlaybackChange::Unchanged);
        }
        if !self.transport.is_paused().await {
            return Ok(PlaybackChange::NothingPlaying);
        }

        self.transport.resume()?;
        self.set_state(PlayerState::Playing);
        info!("▶️ Resumed in guild {}", self.guild_id);
        Ok(PlaybackChange::Changed)
    }

    /// Stops the current track; the loop advances through the same finished
    /// signal as a natural end.
    pub fn skip(&self) -> Result<PlaybackChange, TransportError> {
        if self.current.lock().is_none() {
            return Ok(PlaybackChange::NothingPlaying);
        }

        self.transport.stop()?;
        info!("⏭️ Skipped in guild {}", self.guild_id);
        Ok(PlaybackChange::Changed)
    }

    pub async fn shuffle(&self) -> usize {
        let shuffled = self.queue.shuffle();
        self.refresh_status().await;
        shuffled
    }

    /// Sets the volume from a percentage in `[1, 100]`.
    pub fn set_volume(&self, percent: f64) -> Result<f32, ConfigurationError> {
        if !(1.0..=100.0).contains(&percent) {
            return Err(ConfigurationError::VolumeOutOfRange(percent));
        }

        let volume = (percent / 100.0) as f32;
        *self.volume.lock() = volume;
        if let Err(e) = self.transport.set_volume(volume) {
            warn!("Volume not applied to the live track: {}", e);
        }
        info!("🔊 Volume set to {}% in guild {}", percent, self.guild_id);
        Ok(volume)
    }

    /// Edits the live status message to match the current state.
    pub async fn refresh_status(&self) {
        let current = self.current.lock().clone();
        let queue = self.queue.snapshot();
        let channel = self.transport.channel_name();

        self.display
            .lock()
            .await
            .update(current.as_ref(), &queue, channel.as_deref())
            .await;
    }

    /// Posts a fresh status message to `sink`, which also becomes the
    /// channel for player notices.
    pub async fn resend_status(&self, sink: Arc<dyn MessageSink>) -> Result<(), DisplayError> {
        *self.notices.lock() = sink.clone();

        let current = self.current.lock().clone();
        let queue = self.queue.snapshot();
        let channel = self.transport.channel_name();

        let mut display = self.display.lock().await;
        display.rerender(current.as_ref(), &queue, channel.as_deref());
        display.resend(sink).await
    }

    pub async fn has_status_message(&self) -> bool {
        self.display.lock().await.has_live_message()
    }

    /// Tears the player down. Safe to call any number of times.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("Player for guild {} already destroyed", self.guild_id);
            return;
        }

        *self.state.lock() = PlayerState::Destroyed;
        info!("🛑 Destroying player for guild {}", self.guild_id);

        self.queue.close();
        self.display.lock().await.flush().await;

        if let Err(e) = self.transport.stop() {
            warn!("Failed to stop playback in guild {}: {}", self.guild_id, e);
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!("Failed to disconnect in guild {}: {}", self.guild_id, e);
        }

        if let Some(players) = self.registry.upgrade() {
            players.remove_if(&self.guild_id, |_, player| {
                std::ptr::eq(Arc::as_ptr(player), self)
            });
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn current(&self) -> Option<Track> {
        self.current.lock().clone()
    }

    pub fn queue_snapshot(&self) -> Vec<Track> {
        self.queue.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn transport(&self) -> &Arc<dyn VoiceTransport> {
        &self.transport
    }

    fn set_state(&self, next: PlayerState) {
        let mut state = self.state.lock();
        if *state != PlayerState::Destroyed {
            *state = next;
        }
    }

    async fn notify(&self, text: &str) {
        let sink = self.notices.lock().clone();
        if let Err(e) = sink.say(text).await {
            warn!("Could not post notice in guild {}: {}", self.guild_id, e);
        }
    }

    async fn report_failures(&self, failures: &[ResolutionError]) {
        for failure in failures {
            warn!("Could not add {}: {}", failure.query, failure.reason);
            self.notify(&format!(
                "```Could not add {} to the queue: {}```",
                failure.query, failure.reason
            ))
            .await;
        }
    }
}
