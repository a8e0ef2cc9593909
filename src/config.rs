use anyhow::{Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::source::SourceMode;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // development command registration

    // Playback
    pub default_volume: f32,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub regather_after: Duration,
    pub source_mode: SourceMode,
    pub max_transport_failures: u32,

    // Extraction
    pub ytdlp_path: String,
    pub worker_threads: usize,
    pub max_playlist_size: usize,

    // Paths
    pub cache_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            idle_timeout: env_duration("IDLE_TIMEOUT", "5m")?,
            connect_timeout: env_duration("CONNECT_TIMEOUT", "10s")?,
            regather_after: env_duration("REGATHER_AFTER", "5m")?,
            source_mode: std::env::var("SOURCE_MODE")
                .unwrap_or_else(|_| "download".to_string())
                .parse()?,
            max_transport_failures: std::env::var("MAX_TRANSPORT_FAILURES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| "./cache".to_string())
                .into(),
        };

        std::fs::create_dir_all(&config.cache_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be between 0.0 and 1.0
    /// - Idle and connect timeouts must be non-zero
    /// - Worker pool and playlist limits must be > 0
    /// - At least one transport failure must be tolerated
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.connect_timeout.is_zero() {
            anyhow::bail!("Connect timeout must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.max_transport_failures == 0 {
            anyhow::bail!("Max transport failures must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {}% vol, idle {}, connect {}, {} mode\n  \
            Extraction: {} workers, {} playlist entries, regather after {}\n  \
            Scratch: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.connect_timeout),
            self.source_mode,
            self.worker_threads,
            self.max_playlist_size,
            humantime::format_duration(self.regather_after),
            self.cache_dir.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            idle_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            regather_after: Duration::from_secs(300),
            source_mode: SourceMode::Download,
            max_transport_failures: 3,

            ytdlp_path: "yt-dlp".to_string(),
            worker_threads: num_cpus::get(),
            max_playlist_size: 100,

            cache_dir: "./cache".into(),
        }
    }
}

fn env_duration(key: &str, default: &str) -> Result<Duration> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("{} must be a duration like `5m` or `30s`, got `{}`", key, raw))
}

impl FromStr for SourceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(SourceMode::Download),
            "stream" => Ok(SourceMode::Stream),
            other => anyhow::bail!("SOURCE_MODE must be `download` or `stream`, got `{}`", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_volume_above_one() {
        let config = Config {
            default_volume: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_idle_timeout() {
        let config = Config {
            idle_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_source_mode_case_insensitively() {
        assert_eq!("Stream".parse::<SourceMode>().unwrap(), SourceMode::Stream);
        assert_eq!(" download ".parse::<SourceMode>().unwrap(), SourceMode::Download);
        assert!("torrent".parse::<SourceMode>().is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("idle 5m"));
    }
}
