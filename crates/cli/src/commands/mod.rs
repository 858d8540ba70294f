//! Subcommand implementations

pub mod config;
pub mod doctor;
pub mod run;
pub mod subscriptions;

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use skyrelay_adapters::{bsky::BskyFeedClient, ledger::SqliteLedger};

use crate::config::AppConfig;

/// Read a secret from the named environment variable
pub(crate) fn load_secret(env_var: &str, purpose: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No env var configured for the {}", purpose);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing env var {} for the {}", env_var, purpose))?;

    if value.trim().is_empty() {
        bail!("Env var {} for the {} is empty", env_var, purpose);
    }

    Ok(SecretString::new(value.into()))
}

pub(crate) async fn open_ledger(config: &AppConfig) -> Result<SqliteLedger> {
    SqliteLedger::new(&config.general.state_db_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open ledger at {}",
                config.general.state_db_path.display()
            )
        })
}

pub(crate) fn build_feed_client(config: &AppConfig) -> Result<BskyFeedClient> {
    BskyFeedClient::with_service_url(&config.bluesky.service_url, &config.poll.feed_filter)
        .context("Failed to initialize Bluesky client")
}
