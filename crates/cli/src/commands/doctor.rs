//! Doctor command - validate configuration and show status

use anyhow::Result;
use serde::Serialize;
use skyrelay_adapters::discord::DiscordDispatcher;
use skyrelay_domain::{FeedClient, LedgerStore};
use std::path::PathBuf;

use crate::args::DoctorArgs;
use crate::commands::{build_feed_client, load_secret, open_ledger};
use crate::config::{AppConfig, DispatchMode};

/// Handle looked up to prove the AppView is reachable
const PROBE_HANDLE: &str = "bsky.app";

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    ledger: CheckResult,
    feed: CheckResult,
    dispatcher: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        ledger: CheckResult::error("Not checked"),
        feed: CheckResult::error("Not checked"),
        dispatcher: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.ledger = check_ledger(config).await;
        report.feed = check_feed(config, args.offline).await;
        report.dispatcher = check_dispatcher(config, args.offline).await;
    }

    let checks = [
        &report.config,
        &report.ledger,
        &report.feed,
        &report.dispatcher,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

async fn check_ledger(config: &AppConfig) -> CheckResult {
    let ledger = match open_ledger(config).await {
        Ok(l) => l,
        Err(e) => return CheckResult::error(format!("{:#}", e)),
    };

    let accounts = match ledger.tracked_accounts().await {
        Ok(a) => a,
        Err(e) => return CheckResult::error(format!("Failed to read tracked accounts: {}", e)),
    };
    let processed = match ledger.processed_count().await {
        Ok(n) => n,
        Err(e) => return CheckResult::error(format!("Failed to count processed posts: {}", e)),
    };

    let message = format!(
        "{}: {} tracked account(s), {} processed post(s)",
        config.general.state_db_path.display(),
        accounts.len(),
        processed
    );
    let details = serde_json::json!({
        "path": config.general.state_db_path,
        "tracked_accounts": accounts.len(),
        "processed_posts": processed,
    });

    if accounts.is_empty() {
        CheckResult::warn(format!("{} (nothing to poll yet)", message)).with_details(details)
    } else {
        CheckResult::ok(message).with_details(details)
    }
}

async fn check_feed(config: &AppConfig, offline: bool) -> CheckResult {
    let client = match build_feed_client(config) {
        Ok(c) => c,
        Err(e) => return CheckResult::error(format!("{:#}", e)),
    };

    if offline {
        return CheckResult::ok(format!(
            "AppView: {} (not contacted, offline)",
            client.service_url()
        ));
    }

    match client.resolve_profile(PROBE_HANDLE).await {
        Ok(profile) => CheckResult::ok(format!(
            "AppView: {} reachable, resolved @{} to {}",
            client.service_url(),
            profile.handle,
            profile.did
        )),
        Err(e) => CheckResult::error(format!(
            "AppView: {} unreachable: {}",
            client.service_url(),
            e
        )),
    }
}

async fn check_dispatcher(config: &AppConfig, offline: bool) -> CheckResult {
    match config.dispatch.mode {
        DispatchMode::Outbox => CheckResult::ok(format!(
            "Mode: outbox, writing to {}",
            config.dispatch.outbox_path.display()
        )),
        DispatchMode::Discord => {
            let env_var = &config.discord.token_env;
            let token = match load_secret(env_var, "Discord bot token") {
                Ok(t) => t,
                Err(e) => return CheckResult::warn(format!("Mode: discord, {:#}", e)),
            };

            if offline {
                return CheckResult::ok(format!("Mode: discord, bot token: {} (set)", env_var));
            }

            let dispatcher =
                match DiscordDispatcher::with_api_base(token, &config.discord.api_base) {
                    Ok(d) => d,
                    Err(e) => return CheckResult::error(format!("Mode: discord, {}", e)),
                };

            match dispatcher.verify_token().await {
                Ok(user) => {
                    CheckResult::ok(format!("Mode: discord, authenticated as {}", user))
                }
                Err(e) => CheckResult::error(format!("Mode: discord, token rejected: {}", e)),
            }
        }
    }
}

fn print_report(report: &DoctorReport) {
    println!("skyrelay Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Ledger", &report.ledger);
    print_check("Bluesky", &report.feed);
    print_check("Dispatch", &report.dispatcher);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: skyrelay run --once --outbox ./outbox.jsonl");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
