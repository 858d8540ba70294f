//! CLI argument definitions

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// skyrelay: relay Bluesky posts into Discord channels
#[derive(Parser, Debug)]
#[command(name = "skyrelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll tracked accounts and dispatch new posts
    Run(RunArgs),

    /// Manage channel subscriptions
    Subscriptions(SubscriptionsArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Process one poll cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Write notifications to this JSONL file instead of sending them
    #[arg(long)]
    pub outbox: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SubscriptionsArgs {
    #[command(subcommand)]
    pub command: SubscriptionsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SubscriptionsCommands {
    /// Subscribe a channel to an account, or update its filters
    Add {
        /// Discord channel ID
        #[arg(long)]
        channel: String,

        /// Account DID or handle
        #[arg(long)]
        account: String,

        /// Notify on top-level posts
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        top_level: bool,

        /// Notify on replies
        #[arg(long, default_value_t = false, action = ArgAction::Set)]
        replies: bool,

        /// Notify on reposts
        #[arg(long, default_value_t = false, action = ArgAction::Set)]
        reposts: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a channel's subscription to an account
    Remove {
        /// Discord channel ID
        #[arg(long)]
        channel: String,

        /// Account DID or handle
        #[arg(long)]
        account: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a channel's subscriptions
    List {
        /// Discord channel ID
        #[arg(long)]
        channel: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Skip checks that need the network
    #[arg(long)]
    pub offline: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
