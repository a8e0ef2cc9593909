use async_trait::async_trait;
use serenity::model::id::MessageId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    error::DisplayError,
    sources::{track::format_duration, Track},
};

/// How many upcoming tracks the status message lists.
pub const QUEUE_PREVIEW: usize = 5;

/// Where the status message and player notices are posted.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_status(&self, view: &StatusView) -> Result<MessageId, DisplayError>;
    async fn edit_status(&self, id: MessageId, view: &StatusView) -> Result<(), DisplayError>;
    async fn delete(&self, id: MessageId) -> Result<(), DisplayError>;
    async fn say(&self, text: &str) -> Result<(), DisplayError>;
}

/// Rendered player summary, independent of how it is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub heading: String,
    pub now_playing: Option<String>,
    pub link: Option<String>,
    pub thumbnail: Option<String>,
    /// Numbered lines for the first [`QUEUE_PREVIEW`] queued tracks.
    pub upcoming: Vec<String>,
    /// Queued tracks not listed in `upcoming`.
    pub more: usize,
    pub queued_total: usize,
    /// Sum over queued tracks whose duration is known.
    pub remaining: Duration,
    pub unknown_durations: usize,
}

impl StatusView {
    pub fn render(current: Option<&Track>, queue: &[Track], channel: Option<&str>) -> Self {
        let heading = match (current, channel) {
            (Some(_), Some(channel)) => format!("Now Playing in {}", channel),
            (Some(_), None) => "Now Playing".to_string(),
            (None, _) => "Not playing anything right now".to_string(),
        };

        let upcoming = queue
            .iter()
            .take(QUEUE_PREVIEW)
            .enumerate()
            .map(|(i, track)| format!("{}. {}", i + 1, track))
            .collect();

        let remaining = queue.iter().filter_map(Track::duration).sum();
        let unknown_durations = queue.iter().filter(|t| t.duration().is_none()).count();

        Self {
            heading,
            now_playing: current.map(ToString::to_string),
            link: current.and_then(|t| t.url()).map(str::to_string),
            thumbnail: current.and_then(|t| t.thumbnail()).map(str::to_string),
            upcoming,
            more: queue.len().saturating_sub(QUEUE_PREVIEW),
            queued_total: queue.len(),
            remaining,
            unknown_durations,
        }
    }

    pub fn footer(&self) -> Option<String> {
        if self.queued_total == 0 {
            return None;
        }

        let mut footer = format!("Estimated queue time: {}", format_duration(self.remaining));
        if self.unknown_durations > 0 {
            footer.push_str(&format!(
                " ({} {} with unknown duration not counted)",
                self.unknown_durations,
                if self.unknown_durations == 1 { "track" } else { "tracks" }
            ));
        }
        Some(footer)
    }
}

impl Default for StatusView {
    fn default() -> Self {
        Self::render(None, &[], None)
    }
}

struct LiveMessage {
    sink: Arc<dyn MessageSink>,
    id: MessageId,
}

/// The single live status message of a guild.
#[derive(Default)]
pub struct StatusDisplay {
    view: StatusView,
    live: Option<LiveMessage>,
}

impl StatusDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_live_message(&self) -> bool {
        self.live.is_some()
    }

    /// Re-renders without touching the live message.
    pub fn rerender(&mut self, current: Option<&Track>, queue: &[Track], channel: Option<&str>) {
        self.view = StatusView::render(current, queue, channel);
    }

    /// Re-renders and edits the live message in place, if there is one.
    pub async fn update(&mut self, current: Option<&Track>, queue: &[Track], channel: Option<&str>) {
        self.rerender(current, queue, channel);

        let Some(live) = &self.live else {
            return;
        };

        match live.sink.edit_status(live.id, &self.view).await {
            Ok(()) => {}
            Err(DisplayError::Gone) => {
                debug!("Status message {} was deleted, waiting for a resend", live.id);
                self.live = None;
            }
            Err(e) => warn!("Failed to edit status message: {}", e),
        }
    }

    /// Replaces the live message with a fresh one posted to `sink`.
    pub async fn resend(&mut self, sink: Arc<dyn MessageSink>) -> Result<(), DisplayError> {
        if let Some(old) = self.live.take() {
            if let Err(e) = old.sink.delete(old.id).await {
                debug!("Old status message {} not deleted: {}", old.id, e);
            }
        }

        let id = sink.send_status(&self.view).await?;
        self.live = Some(LiveMessage { sink, id });
        Ok(())
    }

    /// Removes the live message; used when the player goes away.
    pub async fn flush(&mut self) {
        if let Some(old) = self.live.take() {
            if let Err(e) = old.sink.delete(old.id).await {
                debug!("Status message {} not deleted: {}", old.id, e);
            }
        }
    }
}
