use async_process::{Command, Stdio};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};
use tracing::{debug, info, warn};

use super::{Downloaded, MediaExtractor, MediaInfo, WorkerPool};
use crate::error::ExtractorError;

const AUDIO_FORMAT: &str = "bestaudio/best";

/// `--no-playlist` only bites on links naming both a video and a list, so
/// `watch?v=..&list=..` yields the video while playlist links still expand.
const FLAT_DESCRIBE: &[&str] = &["--dump-single-json", "--flat-playlist", "--no-playlist"];

static UNAVAILABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(private video|video unavailable|has been removed|been terminated|not available in your country|geo.?restrict|members-only|sign in to confirm your age)",
    )
    .expect("valid regex")
});

static NETWORK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(unable to download webpage|timed out|temporary failure in name resolution|connection (reset|refused)|network is unreachable|http error 5\d\d)",
    )
    .expect("valid regex")
});

static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(unsupported url|no video results|http error 404|does not exist)")
        .expect("valid regex")
});

/// yt-dlp JSON as emitted by `--dump-single-json`. Everything is optional;
/// [`RawInfo::into_media`] decides what is usable.
#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    track: Option<String>,
    artist: Option<String>,
    creator: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    entries: Option<Vec<Option<RawInfo>>>,
    #[serde(alias = "_filename")]
    filename: Option<String>,
    #[serde(default)]
    requested_downloads: Vec<RequestedDownload>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RequestedDownload {
    filepath: Option<String>,
}

impl RawInfo {
    fn into_media(self) -> MediaInfo {
        // Flat entries (`_type: url`) carry the page link in `url`; after a
        // full extraction `url` is the direct media link instead.
        let is_reference = matches!(self.kind.as_deref(), Some("url") | Some("url_transparent"));
        let (webpage_url, stream_url) = if is_reference {
            (self.webpage_url.or(self.url), None)
        } else {
            let stream = self.url.filter(|u| Some(u) != self.webpage_url.as_ref());
            (self.webpage_url, stream)
        };

        let title = match (self.track, &self.artist) {
            (Some(track), Some(_)) => Some(track),
            _ => self.title,
        };

        MediaInfo {
            title,
            artist: self.artist.or(self.creator),
            duration: self
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(Duration::from_secs_f64),
            webpage_url,
            stream_url,
            thumbnail: self
                .thumbnail
                .or_else(|| self.thumbnails.into_iter().next().map(|t| t.url)),
            entries: self.entries.map(|entries| {
                entries
                    .into_iter()
                    // yt-dlp emits null for entries it could not list
                    .map(|entry| entry.map(RawInfo::into_media).unwrap_or_default())
                    .collect()
            }),
        }
    }

    /// `ytsearch1:` targets come back wrapped in a one-entry listing.
    fn into_single(mut self) -> Result<RawInfo, ExtractorError> {
        match self.entries.take() {
            Some(entries) => entries
                .into_iter()
                .flatten()
                .next()
                .ok_or_else(|| ExtractorError::NotFound("empty result listing".into())),
            None => Ok(self),
        }
    }

    fn downloaded_path(&self) -> Option<PathBuf> {
        self.requested_downloads
            .iter()
            .find_map(|d| d.filepath.clone())
            .or_else(|| self.filename.clone())
            .map(PathBuf::from)
    }
}

/// Sorts a failed run into not-found / unavailable / network from stderr.
pub fn classify_failure(stderr: &str) -> ExtractorError {
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("yt-dlp exited without output")
        .trim()
        .to_string();

    if UNAVAILABLE.is_match(stderr) {
        ExtractorError::Unavailable(line)
    } else if NOT_FOUND.is_match(stderr) {
        ExtractorError::NotFound(line)
    } else if NETWORK.is_match(stderr) {
        ExtractorError::Network(line)
    } else {
        ExtractorError::Process(line)
    }
}

/// Runs yt-dlp as an external process.
pub struct YtDlpClient {
    binary: String,
    pool: WorkerPool,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, pool: WorkerPool) -> Self {
        Self {
            binary: binary.into(),
            pool,
        }
    }

    /// Checks that the binary runs. Used by `--health-check`.
    pub async fn version(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} --version failed", self.binary);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str], target: &str) -> Result<RawInfo, ExtractorError> {
        let output = self
            .pool
            .run(
                Command::new(&self.binary)
                    .args(args)
                    .args(["--no-warnings", "--socket-timeout", "15", "--"])
                    .arg(target)
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .output(),
            )
            .await
            .map_err(|e| ExtractorError::Process(format!("could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp failed for {}: {}", target, stderr.trim());
            return Err(classify_failure(&stderr));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ExtractorError::Parse(e.to_string()))
    }
}

#[async_trait]
impl MediaExtractor for YtDlpClient {
    async fn search(&self, phrase: &str, limit: usize) -> Result<Vec<MediaInfo>, ExtractorError> {
        let query = format!("ytsearch{}:{}", limit.max(1), phrase);
        let raw = self
            .run(&["--dump-single-json", "--flat-playlist"], &query)
            .await?;

        let hits = raw.into_media().entries.unwrap_or_default();
        debug!("🔍 {} hits for {}", hits.len(), phrase);
        Ok(hits)
    }

    async fn describe(&self, target: &str, flat: bool) -> Result<MediaInfo, ExtractorError> {
        if flat {
            let raw = self.run(FLAT_DESCRIBE, target).await?;
            return Ok(raw.into_media());
        }

        let raw = self
            .run(
                &["--dump-single-json", "--no-playlist", "-f", AUDIO_FORMAT],
                target,
            )
            .await?
            .into_single()?;
        Ok(raw.into_media())
    }

    async fn download(&self, target: &str, template: &Path) -> Result<Downloaded, ExtractorError> {
        let template = format!("{}.%(ext)s", template.display());
        info!("⬇️ Downloading {}", target);

        let raw = self
            .run(
                &[
                    "--dump-single-json",
                    "--no-simulate",
                    "--no-playlist",
                    "--restrict-filenames",
                    "--no-part",
                    "-f",
                    AUDIO_FORMAT,
                    "-o",
                    &template,
                ],
                target,
            )
            .await?
            .into_single()?;

        let path = raw
            .downloaded_path()
            .ok_or_else(|| ExtractorError::Parse("download finished without a file path".into()))?;

        Ok(Downloaded {
            info: raw.into_media(),
            path,
        })
    }
}
