//! # Sources Module
//!
//! Turns what a user typed into [`Track`]s.
//!
//! - [`QueryKind`] classifies a query as a search phrase, a direct link, or
//!   a playlist link using plain substring checks.
//! - [`MediaExtractor`] is the boundary to the extraction process; the
//!   production implementation is [`ytdlp::YtDlpClient`].
//! - [`TrackResolver`] expands a query into tracks, reporting failures per
//!   item so one bad playlist entry never sinks the whole batch.
//!
//! Playlist entries are resolved flat: only what the listing carries is
//! filled in, and the heavy per-track extraction is deferred until the
//! track is about to play.

pub mod pool;
pub mod track;
pub mod ytdlp;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, Stream};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::error::{ExtractorError, ResolutionError, ResolutionReason};

pub use pool::WorkerPool;
pub use track::{Requester, Track};

const PLAYLIST_MARKER: &str = "playlist?list=";

/// Typed view of what the extractor reported about a URL or search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
    /// Canonical page URL.
    pub webpage_url: Option<String>,
    /// Short-lived direct media URL, only present after a full extraction.
    pub stream_url: Option<String>,
    pub thumbnail: Option<String>,
    /// Present when the target was a playlist or a search.
    pub entries: Option<Vec<MediaInfo>>,
}

/// A finished download.
#[derive(Debug, Clone, PartialEq)]
pub struct Downloaded {
    pub info: MediaInfo,
    pub path: PathBuf,
}

/// Interface to the media extraction process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Searches and returns up to `limit` hits in provider order.
    async fn search(&self, phrase: &str, limit: usize) -> Result<Vec<MediaInfo>, ExtractorError>;

    /// Describes a URL without downloading. `flat` skips per-entry
    /// extraction for playlists and leaves stream URLs unresolved.
    async fn describe(&self, target: &str, flat: bool) -> Result<MediaInfo, ExtractorError>;

    /// Downloads the best audio of `target` to a path derived from
    /// `template` (the extension is chosen by the extractor).
    async fn download(&self, target: &str, template: &Path) -> Result<Downloaded, ExtractorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Search(String),
    Direct(String),
    Playlist(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();
        if query.contains(PLAYLIST_MARKER) {
            QueryKind::Playlist(query.to_string())
        } else if query.starts_with("http://") || query.starts_with("https://") {
            QueryKind::Direct(query.to_string())
        } else {
            QueryKind::Search(query.to_string())
        }
    }
}

/// Outcome of resolving one query.
#[derive(Debug, Default)]
pub struct Resolved {
    /// Playable tracks in source order.
    pub tracks: Vec<Track>,
    pub failures: Vec<ResolutionError>,
}

impl Resolved {
    fn single(query: &str, result: Result<Track, ResolutionError>) -> Self {
        debug!("Resolved single query `{}`: ok={}", query, result.is_ok());
        match result {
            Ok(track) => Self {
                tracks: vec![track],
                failures: Vec::new(),
            },
            Err(err) => Self {
                tracks: Vec::new(),
                failures: vec![err],
            },
        }
    }
}

pub struct TrackResolver {
    extractor: Arc<dyn MediaExtractor>,
    max_playlist_size: usize,
}

impl TrackResolver {
    pub fn new(extractor: Arc<dyn MediaExtractor>, max_playlist_size: usize) -> Self {
        Self {
            extractor,
            max_playlist_size,
        }
    }

    pub async fn resolve(&self, query: &str, requester: &Requester) -> Resolved {
        match QueryKind::classify(query) {
            QueryKind::Search(phrase) => {
                Resolved::single(query, self.resolve_search(&phrase, requester).await)
            }
            QueryKind::Direct(url) => {
                Resolved::single(query, self.resolve_direct(&url, requester).await)
            }
            QueryKind::Playlist(url) => self.resolve_playlist(&url, requester).await,
        }
    }

    /// Resolves several queries concurrently. Results arrive in completion
    /// order, not submission order.
    pub fn resolve_batch<'a>(
        &'a self,
        queries: Vec<String>,
        requester: &'a Requester,
    ) -> impl Stream<Item = Resolved> + 'a {
        queries
            .into_iter()
            .map(|query| async move { self.resolve(&query, requester).await })
            .collect::<FuturesUnordered<_>>()
    }

    async fn resolve_search(
        &self,
        phrase: &str,
        requester: &Requester,
    ) -> Result<Track, ResolutionError> {
        // A colon would be read as an extractor prefix (`ytsearch5:`, `scsearch:`)
        let cleaned = phrase.replace(':', "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Err(ResolutionError::new(phrase, ResolutionReason::NotFound));
        }
        let phrase = cleaned;

        info!("🔍 Searching: {}", phrase);
        let hits = self
            .extractor
            .search(phrase, 1)
            .await
            .map_err(|e| e.into_resolution(phrase))?;

        let best = hits
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::new(phrase, ResolutionReason::NotFound))?;

        Track::from_info(&best, requester.clone()).map_err(|r| ResolutionError::new(phrase, r))
    }

    async fn resolve_direct(&self, url: &str, requester: &Requester) -> Result<Track, ResolutionError> {
        if let Err(e) = url::Url::parse(url) {
            return Err(ResolutionError::new(
                url,
                ResolutionReason::Malformed(e.to_string()),
            ));
        }

        debug!("📊 Describing: {}", url);
        let info = self
            .extractor
            .describe(url, true)
            .await
            .map_err(|e| e.into_resolution(url))?;

        // A video link carrying a list parameter can still come back as the list
        let info = match info.entries {
            Some(entries) => entries
                .into_iter()
                .find(|entry| entry.title.as_deref().is_some_and(|t| !t.trim().is_empty()))
                .ok_or_else(|| ResolutionError::new(url, ResolutionReason::NotFound))?,
            None => info,
        };

        let track =
            Track::from_info(&info, requester.clone()).map_err(|r| ResolutionError::new(url, r))?;

        Ok(match track.url() {
            Some(_) => track,
            None => track.with_url(url),
        })
    }

    async fn resolve_playlist(&self, url: &str, requester: &Requester) -> Resolved {
        info!("📋 Expanding playlist: {}", url);
        let info = match self.extractor.describe(url, true).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Playlist {} failed to load: {}", url, e);
                return Resolved {
                    tracks: Vec::new(),
                    failures: vec![e.into_resolution(url)],
                };
            }
        };

        let Some(entries) = info.entries else {
            // Not actually a playlist (single video behind a list link)
            return Resolved::single(
                url,
                Track::from_info(&info, requester.clone()).map_err(|r| ResolutionError::new(url, r)),
            );
        };

        let mut resolved = Resolved::default();
        for (position, entry) in entries.iter().take(self.max_playlist_size).enumerate() {
            let label = entry
                .webpage_url
                .clone()
                .unwrap_or_else(|| format!("{} (entry {})", url, position + 1));

            let mapped = Track::from_info(entry, requester.clone()).and_then(|track| {
                if track.url().is_some() {
                    Ok(track)
                } else {
                    Err(ResolutionReason::Malformed("entry has no url".into()))
                }
            });

            match mapped {
                Ok(track) => resolved.tracks.push(track),
                Err(reason) => {
                    debug!("Skipping playlist entry {}: {}", position + 1, reason);
                    resolved.failures.push(ResolutionError::new(label, reason));
                }
            }
        }

        if entries.len() > self.max_playlist_size {
            info!(
                "📋 Playlist truncated to {} of {} entries",
                self.max_playlist_size,
                entries.len()
            );
        }

        resolved
    }
}
