use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use super::status::StatusView;
use crate::sources::{track::format_duration, Track};

/// Standard palette for the bot's embeds
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Music Bot";

/// Longest list the queue command prints before summarizing the rest.
const QUEUE_PAGE: usize = 10;

/// Discord rejects embeds whose field values exceed this many characters.
const FIELD_LIMIT: usize = 1024;

/// The live status message.
pub fn status_embed(view: &StatusView) -> CreateEmbed {
    let playing = view.now_playing.is_some();

    let description = match (&view.now_playing, &view.link) {
        (Some(line), Some(link)) => format!("{}\n[{}]({})", line, link, link),
        (Some(line), None) => line.clone(),
        (None, _) => "You can add songs to the queue with `/play`".to_string(),
    };

    let mut embed = CreateEmbed::default()
        .title(format!("{} {}", if playing { "🎵" } else { "😴" }, view.heading))
        .description(description)
        .color(if playing { colors::INFO_BLUE } else { colors::NEUTRAL_GRAY });

    if let Some(thumbnail) = &view.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    if view.queued_total > 0 {
        let listing = queue_listing(&view.upcoming, view.more);
        embed = embed.field(format!("Queued songs: {}", view.queued_total), listing, false);
    }

    let footer = view.footer().unwrap_or_else(|| STANDARD_FOOTER.to_string());
    embed.footer(CreateEmbedFooter::new(footer)).timestamp(Timestamp::now())
}

/// Joins the preview lines, dropping trailing ones into the "+N more"
/// count until the field fits.
fn queue_listing(upcoming: &[String], more: usize) -> String {
    let mut shown = upcoming.len();
    loop {
        let hidden = more + (upcoming.len() - shown);
        let mut listing = upcoming[..shown].join("\n");
        if hidden > 0 {
            if !listing.is_empty() {
                listing.push('\n');
            }
            listing.push_str(&format!("+{} more", hidden));
        }

        if shown == 0 || listing.chars().count() <= FIELD_LIMIT {
            return listing;
        }
        shown -= 1;
    }
}

/// Reply to `/queue`.
pub fn queue_embed(current: Option<&Track>, queue: &[Track]) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("📋 Upcoming songs: {}", queue.len()))
        .color(colors::INFO_BLUE);

    if let Some(current) = current {
        embed = embed.field("▶️ Playing", current.to_string(), false);
    }

    if queue.is_empty() {
        return embed
            .description("There are currently no more queued songs.")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let mut description = String::new();
    for (i, track) in queue.iter().take(QUEUE_PAGE).enumerate() {
        let duration = track
            .duration()
            .map(|d| format!(" `[{}]`", format_duration(d)))
            .unwrap_or_default();
        description.push_str(&format!("**{}**. {}{}\n", i + 1, track.title(), duration));
    }
    if queue.len() > QUEUE_PAGE {
        description.push_str(&format!("and {} more...", queue.len() - QUEUE_PAGE));
    }

    let total: Duration = queue.iter().filter_map(Track::duration).sum();
    embed
        .description(description)
        .footer(CreateEmbedFooter::new(format!(
            "Total: {} songs • {}",
            queue.len(),
            format_duration(total)
        )))
}

/// Reply to `/play`.
pub fn tracks_added_embed(added: usize, failed: usize) -> CreateEmbed {
    let (title, color) = match (added, failed) {
        (0, _) => ("❌ Nothing added", colors::ERROR_RED),
        (_, 0) => ("✅ Added to queue", colors::SUCCESS_GREEN),
        _ => ("⚠️ Partially added", colors::WARNING_ORANGE),
    };

    let mut description = format!(
        "**{}** {} added to the queue",
        added,
        if added == 1 { "track" } else { "tracks" }
    );
    if failed > 0 {
        description.push_str(&format!(", **{}** could not be added", failed));
    }

    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(color)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn volume_embed(percent: f64) -> CreateEmbed {
    let emoji = if percent <= 50.0 { "🔉" } else { "🔊" };
    CreateEmbed::default()
        .title(format!("{} Volume", emoji))
        .description(format!("Set the volume to **{}%**", percent))
        .field("📊 Level", volume_bar(percent / 100.0), false)
        .color(colors::INFO_BLUE)
}

fn volume_bar(volume: f64) -> String {
    let segments = 20;
    let filled = ((volume * segments as f64).round() as usize).min(segments);
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::track;
    use crate::ui::status::QUEUE_PREVIEW;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn json(embed: CreateEmbed) -> Value {
        serde_json::to_value(embed).unwrap()
    }

    #[test]
    fn status_embed_lists_queue_and_flags_unknown_durations() {
        let current = track("Now").with_url("https://x.test/now");
        let queue: Vec<Track> = (1..=7).map(|i| track(&format!("Song {}", i))).collect();
        let view = StatusView::render(Some(&current), &queue, Some("Lounge"));

        let embed = json(status_embed(&view));

        assert_eq!(embed["title"], "🎵 Now Playing in Lounge");
        assert_eq!(embed["fields"][0]["name"], "Queued songs: 7");
        assert!(embed["fields"][0]["value"]
            .as_str()
            .unwrap()
            .ends_with("+2 more"));
        assert_eq!(
            embed["footer"]["text"],
            "Estimated queue time: 0:00 (7 tracks with unknown duration not counted)"
        );
    }

    #[test]
    fn long_titles_keep_the_queue_field_within_limits() {
        let queue: Vec<Track> = (0..7)
            .map(|i| {
                track(&format!("{}{}", i, "t".repeat(99)))
                    .with_artist("a".repeat(100))
                    .with_duration(Duration::from_secs(200))
            })
            .collect();
        let view = StatusView::render(Some(&queue[0]), &queue, Some("Lounge"));

        let embed = json(status_embed(&view));

        let value = embed["fields"][0]["value"].as_str().unwrap();
        assert!(value.chars().count() <= FIELD_LIMIT);
        let listed = value.lines().filter(|l| !l.starts_with('+')).count();
        assert!(listed < QUEUE_PREVIEW);
        assert!(value.ends_with(&format!("+{} more", 7 - listed)));
        assert_eq!(embed["fields"][0]["name"], "Queued songs: 7");
    }

    #[test]
    fn short_listings_are_left_alone() {
        let lines = vec!["1. a".to_string(), "2. b".to_string()];
        assert_eq!(queue_listing(&lines, 0), "1. a\n2. b");
        assert_eq!(queue_listing(&lines, 3), "1. a\n2. b\n+3 more");
    }

    #[test]
    fn idle_status_embed_has_no_queue_field() {
        let embed = json(status_embed(&StatusView::default()));
        assert_eq!(embed["title"], "😴 Not playing anything right now");
        assert!(embed.get("fields").map_or(true, |f| f.as_array().unwrap().is_empty()));
    }

    #[test]
    fn queue_embed_summarizes_long_queues() {
        let queue: Vec<Track> = (1..=12)
            .map(|i| track(&format!("Song {}", i)).with_duration(Duration::from_secs(60)))
            .collect();

        let embed = json(queue_embed(None, &queue));

        let description = embed["description"].as_str().unwrap();
        assert!(description.starts_with("**1**. Song 1 `[1:00]`"));
        assert!(description.ends_with("and 2 more..."));
        assert_eq!(embed["footer"]["text"], "Total: 12 songs • 12:00");
    }

    #[test]
    fn volume_bar_is_proportional() {
        assert_eq!(volume_bar(0.5), format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10)));
        assert_eq!(volume_bar(1.0), format!("`[{}]`", "█".repeat(20)));
    }
}
