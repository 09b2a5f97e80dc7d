use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::audio::SessionDefaults;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // commands registered only here when set

    // Sessions
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub queue_preview_size: usize,
    pub idle_timeout_secs: u64,
    pub reaper_interval_secs: u64,

    // Runtime
    pub worker_threads: usize,

    // yt-dlp
    pub ytdlp_path: String,
    pub ytdlp_cookies: Option<PathBuf>,
    pub resolve_timeout_secs: u64,

    // Guilds allowed to use premium filters
    pub premium_guilds: HashSet<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            queue_preview_size: env_or("QUEUE_PREVIEW_SIZE", defaults.queue_preview_size)?,
            idle_timeout_secs: env_or("IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            reaper_interval_secs: env_or("REAPER_INTERVAL_SECS", defaults.reaper_interval_secs)?,

            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_cookies: std::env::var("YTDLP_COOKIES")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            resolve_timeout_secs: env_or("RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?,

            premium_guilds: parse_guild_list(&std::env::var("PREMIUM_GUILDS").unwrap_or_default())?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks on values that would otherwise fail at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is empty");
        }

        if !(0.01..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.01 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.queue_preview_size == 0 {
            anyhow::bail!("Queue preview size must be greater than 0");
        }

        if self.idle_timeout_secs == 0 || self.reaper_interval_secs == 0 {
            anyhow::bail!("Idle timeout and reaper interval must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    /// Configuration for logging, without the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Sessions: {}% vol, {} queue, {} preview, idle after {}\n  \
            Resolver: {} (timeout {}, cookies: {})\n  \
            Runtime: {} workers, {} premium guilds",
            self.guild_id
                .map_or("global".to_string(), |id| format!("in guild {id}")),
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            self.queue_preview_size,
            humantime::format_duration(self.idle_timeout()),
            self.ytdlp_path,
            humantime::format_duration(self.resolve_timeout()),
            self.ytdlp_cookies
                .as_ref()
                .map_or("none".to_string(), |p| p.display().to_string()),
            self.worker_threads,
            self.premium_guilds.len(),
        )
    }

    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults {
            volume: self.default_volume,
            max_queue_size: self.max_queue_size,
            preview_len: self.queue_preview_size,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,
            queue_preview_size: 10,
            idle_timeout_secs: 300, // 5 minutes
            reaper_interval_secs: 60,

            worker_threads: num_cpus::get(),

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_cookies: None,
            resolve_timeout_secs: 30,

            premium_guilds: HashSet::new(),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {val}")),
        _ => Ok(default),
    }
}

/// Comma separated guild ids; blanks are ignored.
fn parse_guild_list(raw: &str) -> Result<HashSet<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .with_context(|| format!("invalid guild id in PREMIUM_GUILDS: {s}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> Config {
        Config {
            discord_token: "token".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_validate_once_token_is_set() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = valid();
        config.default_volume = 1.5;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.resolve_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn guild_list_parsing() {
        assert_eq!(parse_guild_list("").unwrap(), HashSet::new());
        assert_eq!(
            parse_guild_list(" 1, 2 ,,3").unwrap(),
            HashSet::from([1, 2, 3])
        );
        assert!(parse_guild_list("1,abc").is_err());
    }

    #[test]
    fn session_defaults_follow_config() {
        let mut config = valid();
        config.default_volume = 0.3;
        config.max_queue_size = 50;
        config.queue_preview_size = 5;

        let defaults = config.session_defaults();
        assert_eq!(defaults.volume, 0.3);
        assert_eq!(defaults.max_queue_size, 50);
        assert_eq!(defaults.preview_len, 5);
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "secret-token".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("secret-token"));
        assert!(summary.contains("50% vol"));
        assert!(summary.contains("idle after 5m"));
    }
}
