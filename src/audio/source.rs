use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    error::{AcquisitionError, ExtractorError},
    sources::{Downloaded, MediaExtractor, Track},
};

/// How audio is materialized before playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Fetch to a scratch file first.
    Download,
    /// Play a direct media URL, regathered when it may have expired.
    Stream,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Download => write!(f, "download"),
            SourceMode::Stream => write!(f, "stream"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPayload {
    File(PathBuf),
    Stream(String),
}

/// Playable audio for one track, owned by the playback loop.
///
/// A scratch file is removed exactly once: by [`AudioSource::release`]
/// or, if that never ran, when the value is dropped.
#[derive(Debug)]
pub struct AudioSource {
    track: Track,
    payload: AudioPayload,
    scratch: Option<PathBuf>,
}

impl AudioSource {
    pub fn from_file(track: Track, path: PathBuf) -> Self {
        Self {
            track,
            payload: AudioPayload::File(path.clone()),
            scratch: Some(path),
        }
    }

    pub fn from_stream(track: Track, url: impl Into<String>) -> Self {
        Self {
            track,
            payload: AudioPayload::Stream(url.into()),
            scratch: None,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn payload(&self) -> &AudioPayload {
        &self.payload
    }

    /// Frees the scratch file.
    pub async fn release(mut self) {
        if let Some(path) = self.scratch.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("🧹 Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for AudioSource {
    fn drop(&mut self) {
        if let Some(path) = self.scratch.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Turns a queued track into playable audio right before it plays.
#[async_trait]
pub trait AudioSourceProvider: Send + Sync {
    async fn acquire(&self, guild_id: GuildId, track: &Track) -> Result<AudioSource, AcquisitionError>;
}

/// Provider backed by the extraction process.
pub struct YtDlpProvider {
    extractor: Arc<dyn MediaExtractor>,
    mode: SourceMode,
    scratch_dir: PathBuf,
    regather_after: Duration,
    jobs: AtomicU64,
}

impl YtDlpProvider {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        mode: SourceMode,
        scratch_dir: impl Into<PathBuf>,
        regather_after: Duration,
    ) -> Self {
        Self {
            extractor,
            mode,
            scratch_dir: scratch_dir.into(),
            regather_after,
            jobs: AtomicU64::new(0),
        }
    }

    /// `<scratch>/<guild>-<job>`; the extractor appends the extension.
    fn scratch_template(&self, guild_id: GuildId) -> PathBuf {
        let job = self.jobs.fetch_add(1, Ordering::Relaxed);
        self.scratch_dir.join(format!("{}-{}", guild_id, job))
    }

    async fn download(&self, guild_id: GuildId, track: &Track) -> Result<AudioSource, AcquisitionError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let target = track.extraction_target();
        let template = self.scratch_template(guild_id);
        let downloaded = match self.fetch(&target, &template).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                discard_partial(&template).await;
                return Err(e);
            }
        };

        let mut track = track.clone();
        track.absorb(&downloaded.info);
        info!("💾 Downloaded {} to {}", track.title(), downloaded.path.display());
        Ok(AudioSource::from_file(track, downloaded.path))
    }

    async fn fetch(&self, target: &str, template: &Path) -> Result<Downloaded, AcquisitionError> {
        let downloaded = self
            .extractor
            .download(target, template)
            .await
            .map_err(|e| extraction_error(target, e))?;

        if !is_inside(&downloaded.path, &self.scratch_dir) {
            // Never adopt (and later delete) a file outside our scratch area
            return Err(AcquisitionError::Extraction {
                target: target.to_string(),
                reason: format!("unexpected output path {}", downloaded.path.display()),
            });
        }

        if tokio::fs::metadata(&downloaded.path).await.is_err() {
            return Err(AcquisitionError::Extraction {
                target: target.to_string(),
                reason: "download reported success but no file was written".into(),
            });
        }

        Ok(downloaded)
    }

    async fn stream(&self, track: &Track) -> Result<AudioSource, AcquisitionError> {
        if let Some(url) = track.stream_url() {
            if track.queued_at().elapsed() < self.regather_after {
                debug!("🎯 Reusing stream link for {}", track.title());
                return Ok(AudioSource::from_stream(track.clone(), url));
            }
        }

        let target = track.extraction_target();
        debug!("🔄 Regathering stream link for {}", track.title());
        let info = self
            .extractor
            .describe(&target, false)
            .await
            .map_err(|e| extraction_error(&target, e))?;

        let url = info
            .stream_url
            .clone()
            .ok_or_else(|| AcquisitionError::Expired(target.clone()))?;

        let mut track = track.clone();
        track.absorb(&info);
        Ok(AudioSource::from_stream(track, url))
    }
}

#[async_trait]
impl AudioSourceProvider for YtDlpProvider {
    async fn acquire(&self, guild_id: GuildId, track: &Track) -> Result<AudioSource, AcquisitionError> {
        match self.mode {
            SourceMode::Download => self.download(guild_id, track).await,
            SourceMode::Stream => self.stream(track).await,
        }
    }
}

/// Removes whatever a failed download left under `template`, whichever
/// extension the extractor picked.
async fn discard_partial(template: &Path) {
    let (Some(dir), Some(stem)) = (template.parent(), template.file_name()) else {
        return;
    };
    let stem = stem.to_string_lossy();
    let prefix = format!("{}.", stem);

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not scan scratch directory {:?}: {}", dir, e);
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name != stem && !name.starts_with(&prefix) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => debug!("🧹 Removed partial download {}", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial download {}: {}", name, e),
        }
    }
}

fn extraction_error(target: &str, err: ExtractorError) -> AcquisitionError {
    AcquisitionError::Extraction {
        target: target.to_string(),
        reason: err.to_string(),
    }
}

fn is_inside(path: &Path, dir: &Path) -> bool {
    match (path.parent(), dir.canonicalize()) {
        (Some(parent), Ok(dir)) => parent.canonicalize().map(|p| p == dir).unwrap_or(false),
        _ => false,
    }
}

/// Removes scratch files a previous run left behind in `dir`.
///
/// Only `{guild}-{job}.{ext}` names are touched. Returns how many were removed.
pub fn sweep_scratch_dir(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() || !is_scratch_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not remove stale scratch file {:?}: {}", entry.path(), e),
        }
    }
    Ok(removed)
}

fn is_scratch_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or_default();
    match stem.split_once('-') {
        Some((guild, job)) => {
            !guild.is_empty()
                && !job.is_empty()
                && guild.bytes().all(|b| b.is_ascii_digit())
                && job.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
