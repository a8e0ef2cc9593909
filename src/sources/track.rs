use serenity::model::id::UserId;
use std::{fmt, time::Duration};
use tokio::time::Instant;

use super::MediaInfo;
use crate::error::ResolutionReason;

const PRIVATE_TITLE: &str = "[Private video]";
const DELETED_TITLE: &str = "[Deleted video]";

/// The user who queued a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
}

impl Requester {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A requested song.
///
/// Metadata may be partial right after resolution (flat playlist entries,
/// search hits); [`Track::absorb`] fills it in once the heavier extraction
/// pass runs at play time.
#[derive(Debug, Clone)]
pub struct Track {
    title: String,
    artist: Option<String>,
    duration: Option<Duration>,
    url: Option<String>,
    thumbnail: Option<String>,
    stream_url: Option<String>,
    requester: Requester,
    queued_at: Instant,
}

impl Track {
    pub fn new(title: impl Into<String>, requester: Requester) -> Self {
        Self {
            title: title.into(),
            artist: None,
            duration: None,
            url: None,
            thumbnail: None,
            stream_url: None,
            requester,
            queued_at: Instant::now(),
        }
    }

    /// Builds a track from extractor output, rejecting entries the platform
    /// reports as private or deleted.
    pub fn from_info(info: &MediaInfo, requester: Requester) -> Result<Self, ResolutionReason> {
        let title = info
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ResolutionReason::Malformed("entry has no title".into()))?;

        match title {
            PRIVATE_TITLE => return Err(ResolutionReason::Unavailable("private video".into())),
            DELETED_TITLE => return Err(ResolutionReason::Unavailable("deleted video".into())),
            _ => {}
        }

        let mut track = Track::new(title, requester);
        track.absorb(info);
        Ok(track)
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }
    pub fn requester(&self) -> &Requester {
        &self.requester
    }
    pub fn queued_at(&self) -> Instant {
        self.queued_at
    }

    // Setters
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = Some(stream_url.into());
        self
    }

    /// Merges freshly extracted metadata. Fields the extractor did not
    /// report keep their previous value, so a known duration stays known.
    pub fn absorb(&mut self, info: &MediaInfo) {
        if let Some(title) = info.title.as_deref().filter(|t| !t.trim().is_empty()) {
            self.title = title.trim().to_string();
        }
        if let Some(artist) = &info.artist {
            self.artist = Some(artist.clone());
        }
        if let Some(duration) = info.duration {
            self.duration = Some(duration);
        }
        if let Some(url) = &info.webpage_url {
            self.url = Some(url.clone());
        }
        if let Some(thumbnail) = &info.thumbnail {
            self.thumbnail = Some(thumbnail.clone());
        }
        if let Some(stream_url) = &info.stream_url {
            self.stream_url = Some(stream_url.clone());
        }
    }

    /// What to hand the extractor when this track is about to play: the
    /// canonical URL when known, otherwise a one-result search.
    pub fn extraction_target(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => match &self.artist {
                Some(artist) => format!("ytsearch1:{} {}", self.title, artist),
                None => format!("ytsearch1:{}", self.title),
            },
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.artist {
            Some(artist) => write!(f, "`{}` by `{}`", self.title, artist)?,
            None => write!(f, "`{}`", self.title)?,
        }
        write!(f, " requested by `{}`", self.requester.name)?;
        match self.duration {
            Some(duration) => write!(f, " ({})", format_duration(duration)),
            None => write!(f, " (unknown)"),
        }
    }
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn requester() -> Requester {
        Requester::new(UserId::new(7), "alice")
    }

    #[test]
    fn absorb_never_forgets_a_known_duration() {
        let mut track = Track::new("Song", requester()).with_duration(Duration::from_secs(200));
        track.absorb(&MediaInfo {
            title: Some("Song (Remastered)".into()),
            ..MediaInfo::default()
        });

        assert_eq!(track.duration(), Some(Duration::from_secs(200)));
        assert_eq!(track.title(), "Song (Remastered)");
    }

    #[test]
    fn absorb_fills_lazy_fields() {
        let mut track = Track::new("Song", requester());
        track.absorb(&MediaInfo {
            duration: Some(Duration::from_secs(95)),
            webpage_url: Some("https://www.youtube.com/watch?v=abc".into()),
            thumbnail: Some("https://i.ytimg.com/abc.jpg".into()),
            ..MediaInfo::default()
        });

        assert_eq!(track.duration(), Some(Duration::from_secs(95)));
        assert_eq!(track.url(), Some("https://www.youtube.com/watch?v=abc"));
        assert_eq!(track.thumbnail(), Some("https://i.ytimg.com/abc.jpg"));
    }

    #[test]
    fn private_and_deleted_entries_are_rejected() {
        let private = MediaInfo {
            title: Some("[Private video]".into()),
            ..MediaInfo::default()
        };
        let deleted = MediaInfo {
            title: Some("[Deleted video]".into()),
            ..MediaInfo::default()
        };

        assert!(matches!(
            Track::from_info(&private, requester()),
            Err(ResolutionReason::Unavailable(_))
        ));
        assert!(matches!(
            Track::from_info(&deleted, requester()),
            Err(ResolutionReason::Unavailable(_))
        ));
    }

    #[test]
    fn untitled_entries_are_malformed() {
        let info = MediaInfo {
            title: Some("   ".into()),
            ..MediaInfo::default()
        };
        assert!(matches!(
            Track::from_info(&info, requester()),
            Err(ResolutionReason::Malformed(_))
        ));
    }

    #[test]
    fn extraction_target_falls_back_to_search() {
        let lazy = Track::new("Teardrop", requester()).with_artist("Massive Attack");
        assert_eq!(lazy.extraction_target(), "ytsearch1:Teardrop Massive Attack");

        let linked = lazy.with_url("https://youtu.be/u7K72X4eo_s");
        assert_eq!(linked.extraction_target(), "https://youtu.be/u7K72X4eo_s");
    }

    #[test]
    fn display_matches_status_line_format() {
        let track = Track::new("Teardrop", requester())
            .with_artist("Massive Attack")
            .with_duration(Duration::from_secs(330));
        assert_eq!(
            track.to_string(),
            "`Teardrop` by `Massive Attack` requested by `alice` (5:30)"
        );

        let unknown = Track::new("Live set", requester());
        assert_eq!(unknown.to_string(), "`Live set` requested by `alice` (unknown)");
    }

    #[test]
    fn formats_hours() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
    }
}
