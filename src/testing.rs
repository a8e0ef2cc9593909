//! In-memory stand-ins for Discord and the voice driver.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    collections::HashSet,
    path::PathBuf,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use crate::{
    audio::{
        source::{AudioSource, AudioSourceProvider},
        transport::{FinishNotifier, VoiceTransport},
    },
    error::{AcquisitionError, DisplayError, TransportError},
    sources::{Requester, Track},
    ui::status::{MessageSink, StatusView},
};

pub fn requester() -> Requester {
    Requester::new(UserId::new(42), "tester")
}

pub fn track(title: &str) -> Track {
    Track::new(title, requester())
}

/// Voice transport that records calls. A played track only ends when the
/// test calls [`FakeTransport::finish_current`] or the player stops it.
pub struct FakeTransport {
    connected: AtomicBool,
    paused: AtomicBool,
    fail_play: AtomicBool,
    pending: Mutex<Option<FinishNotifier>>,
    played: Mutex<Vec<String>>,
    volumes: Mutex<Vec<f32>>,
    channel: Mutex<(ChannelId, String)>,
    stops: AtomicUsize,
    disconnects: AtomicUsize,
    finishes: AtomicUsize,
    on_play: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            fail_play: AtomicBool::new(false),
            pending: Mutex::new(None),
            played: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
            channel: Mutex::new((ChannelId::new(10), "General".to_string())),
            stops: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            finishes: AtomicUsize::new(0),
            on_play: Mutex::new(None),
        }
    }

    /// Runs `hook` inside every successful `play`, before it returns.
    pub fn on_play(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_play.lock() = Some(Box::new(hook));
    }

    pub fn disconnected() -> Self {
        let transport = Self::new();
        transport.connected.store(false, Ordering::SeqCst);
        transport
    }

    pub fn fail_next_plays(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    /// Simulates the current track reaching its end.
    pub fn finish_current(&self) -> bool {
        self.resolve_pending()
    }

    fn resolve_pending(&self) -> bool {
        let pending = self.pending.lock().take();
        match pending {
            Some(notifier) if notifier.notify() => {
                self.finishes.fetch_add(1, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.lock().clone()
    }

    pub fn is_mid_track(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn play(
        &self,
        source: &AudioSource,
        volume: f32,
        finished: FinishNotifier,
    ) -> Result<(), TransportError> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(TransportError::Driver("fake play failure".into()));
        }
        self.played.lock().push(source.track().title().to_string());
        self.volumes.lock().push(volume);
        self.paused.store(false, Ordering::SeqCst);
        *self.pending.lock() = Some(finished);
        if let Some(hook) = self.on_play.lock().as_ref() {
            hook();
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), TransportError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.resolve_pending();
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        self.volumes.lock().push(volume);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        self.is_mid_track() && !self.paused.load(Ordering::SeqCst)
    }

    async fn is_paused(&self) -> bool {
        self.is_mid_track() && self.paused.load(Ordering::SeqCst)
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn channel_id(&self) -> Option<ChannelId> {
        Some(self.channel.lock().0)
    }

    fn channel_name(&self) -> Option<String> {
        Some(self.channel.lock().1.clone())
    }

    async fn move_to(&self, channel_id: ChannelId, channel_name: String) -> Result<(), TransportError> {
        *self.channel.lock() = (channel_id, channel_name);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Message sink that keeps track of which messages are still live.
pub struct RecordingSink {
    next_id: AtomicU64,
    live: Mutex<HashSet<MessageId>>,
    sent: AtomicUsize,
    edits: AtomicUsize,
    notices: Mutex<Vec<String>>,
    last_view: Mutex<Option<StatusView>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            sent: AtomicUsize::new(0),
            edits: AtomicUsize::new(0),
            notices: Mutex::new(Vec::new()),
            last_view: Mutex::new(None),
        }
    }

    pub fn delete_externally(&self, id: MessageId) {
        self.live.lock().remove(&id);
    }

    pub fn live_ids(&self) -> Vec<MessageId> {
        self.live.lock().iter().copied().collect()
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn edits(&self) -> usize {
        self.edits.load(Ordering::SeqCst)
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }

    pub fn last_view(&self) -> Option<StatusView> {
        self.last_view.lock().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_status(&self, view: &StatusView) -> Result<MessageId, DisplayError> {
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().insert(id);
        self.sent.fetch_add(1, Ordering::SeqCst);
        *self.last_view.lock() = Some(view.clone());
        Ok(id)
    }

    async fn edit_status(&self, id: MessageId, view: &StatusView) -> Result<(), DisplayError> {
        if !self.live.lock().contains(&id) {
            return Err(DisplayError::Gone);
        }
        self.edits.fetch_add(1, Ordering::SeqCst);
        *self.last_view.lock() = Some(view.clone());
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<(), DisplayError> {
        if self.live.lock().remove(&id) {
            Ok(())
        } else {
            Err(DisplayError::Gone)
        }
    }

    async fn say(&self, text: &str) -> Result<(), DisplayError> {
        self.notices.lock().push(text.to_string());
        Ok(())
    }
}

/// Provider that writes a small scratch file per acquisition, failing for
/// titles it was told to reject.
pub struct ScratchProvider {
    dir: tempfile::TempDir,
    jobs: AtomicU64,
    rejected: Mutex<HashSet<String>>,
}

impl ScratchProvider {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            jobs: AtomicU64::new(0),
            rejected: Mutex::new(HashSet::new()),
        }
    }

    pub fn reject(&self, title: &str) {
        self.rejected.lock().insert(title.to_string());
    }

    pub fn scratch_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AudioSourceProvider for ScratchProvider {
    async fn acquire(&self, guild_id: GuildId, track: &Track) -> Result<AudioSource, AcquisitionError> {
        if self.rejected.lock().contains(track.title()) {
            return Err(AcquisitionError::Extraction {
                target: track.extraction_target(),
                reason: "Video unavailable".into(),
            });
        }

        let job = self.jobs.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.path().join(format!("{}-{}.webm", guild_id, job));
        std::fs::write(&path, b"audio")?;
        Ok(AudioSource::from_file(track.clone(), path))
    }
}
