//! # Error taxonomy
//!
//! Typed failures of the playback engine. Each one is caught at the
//! boundary nearest its source and turned into a channel notice; none of
//! them is allowed to end a guild's playback loop.
//!
//! - [`ResolutionError`]: a query could not become track metadata
//! - [`AcquisitionError`]: metadata resolved but no playable audio
//! - [`TransportError`]: voice connection trouble
//! - [`ConfigurationError`]: invalid user input such as volume
//! - [`DisplayError`]: the status message could not be sent or edited

use thiserror::Error;

/// Why a query failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionReason {
    NotFound,
    /// Private, removed, or region-locked content.
    Unavailable(String),
    Network(String),
    /// The extractor answered, but not with anything we can map to a track.
    Malformed(String),
}

impl std::fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionReason::NotFound => write!(f, "no match found"),
            ResolutionReason::Unavailable(why) => write!(f, "content unavailable: {}", why),
            ResolutionReason::Network(why) => write!(f, "network failure: {}", why),
            ResolutionReason::Malformed(why) => write!(f, "unexpected metadata: {}", why),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not resolve `{query}`: {reason}")]
pub struct ResolutionError {
    pub query: String,
    pub reason: ResolutionReason,
}

impl ResolutionError {
    pub fn new(query: impl Into<String>, reason: ResolutionReason) -> Self {
        Self {
            query: query.into(),
            reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("extraction failed for `{target}`: {reason}")]
    Extraction { target: String, reason: String },
    #[error("stream link for `{0}` expired and could not be regathered")]
    Expired(String),
    #[error("scratch storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("timed out connecting to voice channel `{0}`")]
    Timeout(String),
    #[error("failed to join voice channel: {0}")]
    Join(String),
    #[error("voice driver error: {0}")]
    Driver(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Please enter a value between 1 and 100 (got {0}).")]
    VolumeOutOfRange(f64),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DisplayError {
    /// The live message was deleted by someone else.
    #[error("status message no longer exists")]
    Gone,
    #[error("discord http error: {0}")]
    Http(String),
}

/// Failure reported by the media extraction process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractorError {
    #[error("nothing found for `{0}`")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("network: {0}")]
    Network(String),
    #[error("extractor process failed: {0}")]
    Process(String),
    #[error("could not parse extractor output: {0}")]
    Parse(String),
}

impl ExtractorError {
    /// Maps an extractor failure on `query` into the resolver's taxonomy.
    pub fn into_resolution(self, query: &str) -> ResolutionError {
        let reason = match self {
            ExtractorError::NotFound(_) => ResolutionReason::NotFound,
            ExtractorError::Unavailable(why) => ResolutionReason::Unavailable(why),
            ExtractorError::Network(why) | ExtractorError::Process(why) => {
                ResolutionReason::Network(why)
            }
            ExtractorError::Parse(why) => ResolutionReason::Malformed(why),
        };
        ResolutionError::new(query, reason)
    }
}
