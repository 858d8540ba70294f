//! Run command - poll, dedup, classify and dispatch loop

use anyhow::{Context, Result};
use skyrelay_adapters::{
    discord::DiscordDispatcher,
    outbox::{OutboxDispatcher, OutboxWriter},
};
use skyrelay_domain::{
    Dispatcher, SystemClock,
    usecases::{PollScheduler, Poller, PollerConfig, RenderConfig},
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::RunArgs;
use crate::commands::{build_feed_client, load_secret, open_ledger};
use crate::config::{AppConfig, DispatchMode};

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    // --outbox forces outbox mode
    let mode = if args.outbox.is_some() {
        DispatchMode::Outbox
    } else {
        config.dispatch.mode
    };
    let outbox_path = args
        .outbox
        .clone()
        .unwrap_or_else(|| config.dispatch.outbox_path.clone());

    tracing::info!(
        once = args.once,
        mode = ?mode,
        interval_secs = config.poll.interval_secs,
        page_size = config.poll.page_size,
        "Starting skyrelay run"
    );

    // Build dependencies; configuration problems surface before any polling
    let dispatcher = build_dispatcher(&config, mode, outbox_path).await?;
    let ledger = Arc::new(open_ledger(&config).await?);
    let feed = Arc::new(build_feed_client(&config)?);
    let clock = Arc::new(SystemClock);

    let poller = Arc::new(Poller::new(
        feed,
        ledger,
        dispatcher,
        clock,
        poller_config(&config),
    ));

    if args.once {
        tracing::info!("Running single poll cycle");
        let report = poller.poll_once().await.context("Poll cycle failed")?;
        tracing::info!(
            accounts = report.accounts_polled,
            failed = report.accounts_failed,
            items = report.items_seen,
            novel = report.novel,
            skipped = report.skipped_malformed,
            dispatched = report.dispatched,
            dispatch_failures = report.dispatch_failures,
            pruned = report.pruned,
            "Poll cycle complete"
        );
    } else {
        let handle = PollScheduler::new(poller, config.poll.interval()).start();

        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        tracing::info!("Shutdown signal received");

        let ticks = handle
            .shutdown()
            .await
            .context("Poll scheduler task failed")?;
        tracing::info!(ticks, "Shutting down gracefully");
    }

    tracing::info!("skyrelay run completed");
    Ok(())
}

async fn build_dispatcher(
    config: &AppConfig,
    mode: DispatchMode,
    outbox_path: PathBuf,
) -> Result<Arc<dyn Dispatcher>> {
    match mode {
        DispatchMode::Discord => {
            let token = load_secret(&config.discord.token_env, "Discord bot token")?;
            let dispatcher = DiscordDispatcher::with_api_base(token, &config.discord.api_base)
                .context("Failed to initialize Discord dispatcher")?;
            Ok(Arc::new(dispatcher))
        }
        DispatchMode::Outbox => {
            let writer = OutboxWriter::new(outbox_path.clone())
                .await
                .context("Failed to initialize outbox writer")?;
            tracing::info!(outbox = %outbox_path.display(), "Writing notifications to outbox");
            Ok(Arc::new(OutboxDispatcher::new(writer)))
        }
    }
}

fn poller_config(config: &AppConfig) -> PollerConfig {
    PollerConfig {
        page_size: config.poll.page_size,
        fetch_timeout: config.poll.fetch_timeout(),
        retention_per_account: config.poll.retention_per_account,
        dedup_cache_size: config.poll.dedup_cache_size,
        render_config: RenderConfig::default(),
    }
}
