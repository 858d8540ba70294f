//! Configuration loading and management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub bluesky: BlueskyConfig,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_feed_filter")]
    pub feed_filter: String,

    /// 0 disables the in-memory cache
    #[serde(default = "default_dedup_cache_size")]
    pub dedup_cache_size: usize,

    /// 0 keeps every processed post
    #[serde(default = "default_retention_per_account")]
    pub retention_per_account: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Discord,
    Outbox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DispatchMode,

    #[serde(default = "default_outbox_path")]
    pub outbox_path: PathBuf,
}

// Default value functions
fn default_state_db_path() -> PathBuf {
    PathBuf::from("./skyrelay.sqlite")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

fn default_feed_filter() -> String {
    skyrelay_adapters::bsky::DEFAULT_FEED_FILTER.to_string()
}

fn default_dedup_cache_size() -> usize {
    100
}

fn default_retention_per_account() -> usize {
    100
}

fn default_service_url() -> String {
    skyrelay_adapters::bsky::DEFAULT_SERVICE_URL.to_string()
}

fn default_token_env() -> String {
    "DISCORD_TOKEN".to_string()
}

fn default_api_base() -> String {
    skyrelay_adapters::discord::DEFAULT_API_BASE.to_string()
}

fn default_outbox_path() -> PathBuf {
    PathBuf::from("./outbox.jsonl")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_db_path: default_state_db_path(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            page_size: default_page_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            feed_filter: default_feed_filter(),
            dedup_cache_size: default_dedup_cache_size(),
            retention_per_account: default_retention_per_account(),
        }
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_base: default_api_base(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            outbox_path: default_outbox_path(),
        }
    }
}

const FEED_FILTERS: &[&str] = &[
    "posts_with_replies",
    "posts_no_replies",
    "posts_with_media",
    "posts_and_author_threads",
];

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("SKYRELAY")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Starting log level: `--log-level`, else the config file's, else `info`.
    /// A config that fails to load falls back quietly; the command reports it.
    pub fn log_level(cli_level: Option<&str>, config_path: Option<&Path>) -> String {
        if let Some(level) = cli_level {
            return level.to_string();
        }
        Self::load(config_path)
            .map(|config| config.general.log_level)
            .unwrap_or_else(|_| default_log_level())
    }

    /// Reject values the poller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            bail!("poll.interval_secs must be at least 1");
        }
        if self.poll.fetch_timeout_secs == 0 {
            bail!("poll.fetch_timeout_secs must be at least 1");
        }
        if !(1..=100).contains(&self.poll.page_size) {
            bail!("poll.page_size must be between 1 and 100, got {}", self.poll.page_size);
        }
        if !FEED_FILTERS.contains(&self.poll.feed_filter.as_str()) {
            bail!(
                "poll.feed_filter must be one of {}, got {:?}",
                FEED_FILTERS.join(", "),
                self.poll.feed_filter
            );
        }
        if self.poll.retention_per_account != 0
            && self.poll.retention_per_account < self.poll.page_size
        {
            tracing::warn!(
                retention = self.poll.retention_per_account,
                page_size = self.poll.page_size,
                "retention_per_account is below page_size; one page is kept instead"
            );
        }
        Ok(())
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# skyrelay configuration
# Every key can be overridden from the environment, e.g.
# SKYRELAY__POLL__INTERVAL_SECS=30

[general]
state_db_path = "./skyrelay.sqlite"
log_level = "info"

[poll]
interval_secs = 60
# Items fetched per account per tick (1-100)
page_size = 10
fetch_timeout_secs = 20
# posts_with_replies, posts_no_replies, posts_with_media, posts_and_author_threads
feed_filter = "posts_with_replies"
# 0 disables the in-memory dedup cache
dedup_cache_size = 100
# Processed posts kept per account; 0 keeps everything
retention_per_account = 100

[bluesky]
service_url = "https://public.api.bsky.app/xrpc"

[discord]
# Name of the environment variable holding the bot token
token_env = "DISCORD_TOKEN"
api_base = "https://discord.com/api/v10"

[dispatch]
mode = "discord"  # discord, outbox
outbox_path = "./outbox.jsonl"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_toml_matches_defaults() {
        let parsed: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(parsed.general.state_db_path, defaults.general.state_db_path);
        assert_eq!(parsed.poll.interval_secs, defaults.poll.interval_secs);
        assert_eq!(parsed.poll.page_size, defaults.poll.page_size);
        assert_eq!(parsed.poll.feed_filter, defaults.poll.feed_filter);
        assert_eq!(parsed.bluesky.service_url, defaults.bluesky.service_url);
        assert_eq!(parsed.discord.token_env, "DISCORD_TOKEN");
        assert_eq!(parsed.dispatch.mode, DispatchMode::Discord);
        parsed.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_page_size() {
        let mut config = AppConfig::default();
        config.poll.page_size = 0;
        assert!(config.validate().is_err());

        config.poll.page_size = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_feed_filter() {
        let mut config = AppConfig::default();
        config.poll.feed_filter = "everything".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_level_comes_from_flag_then_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_level = \"debug\"\n").unwrap();

        assert_eq!(AppConfig::log_level(None, Some(&path)), "debug");
        assert_eq!(AppConfig::log_level(Some("warn"), Some(&path)), "warn");
        assert_eq!(
            AppConfig::log_level(None, Some(&dir.path().join("missing.toml"))),
            "info"
        );
    }

    #[test]
    fn outbox_mode_parses() {
        let parsed: AppConfig = toml::from_str("[dispatch]\nmode = \"outbox\"\n").unwrap();
        assert_eq!(parsed.dispatch.mode, DispatchMode::Outbox);
        assert_eq!(parsed.dispatch.outbox_path, PathBuf::from("./outbox.jsonl"));
    }
}
