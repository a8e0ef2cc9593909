//! # Audio Module
//!
//! Per-guild playback engine.
//!
//! ## Architecture
//!
//! ### [`registry`] - Player Registry
//! - One [`player::GuildPlayer`] per guild, created on first use
//! - Atomic get-or-create so two racing commands never start two loops
//!
//! ### [`player`] - Guild Player
//! - Owns the queue, volume, current track and status message
//! - Runs the playback loop: wait for a track, acquire audio, play, wait
//!   for the finished signal, clean up
//! - Disconnects after the idle timeout
//!
//! ### [`queue`] - Track Queue
//! - FIFO with a bounded async wait for the next track
//!
//! ### [`source`] - Audio Sources
//! - Materializes a queued track into a file or stream right before it
//!   plays, and removes scratch files afterwards
//!
//! ### [`transport`] - Voice Transport
//! - Boundary to the voice connection; the songbird implementation lives
//!   here too
//!
//! ## Completion
//!
//! A track ends one way only: the transport resolves the
//! [`transport::FinishNotifier`] it was handed. Natural end, driver error,
//! skip and destroy all go through it, so the loop never sees a track
//! finish twice.

pub mod player;
pub mod queue;
pub mod registry;
pub mod source;
pub mod transport;
