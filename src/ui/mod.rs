//! Discord-facing presentation: the live status message, embeds, and the
//! channel adapter that posts them.

pub mod channel;
pub mod embeds;
pub mod status;
