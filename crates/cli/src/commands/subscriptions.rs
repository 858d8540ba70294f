//! Subscriptions command - add, remove and list channel subscriptions

use anyhow::Result;
use skyrelay_domain::{
    SubscriptionFilter, UpsertOutcome,
    usecases::{ListedSubscription, SubscriptionService},
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::{SubscriptionsArgs, SubscriptionsCommands};
use crate::commands::{build_feed_client, open_ledger};
use crate::config::AppConfig;

pub async fn execute(args: SubscriptionsArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let ledger = Arc::new(open_ledger(&config).await?);
    let feed = Arc::new(build_feed_client(&config)?);
    let service = SubscriptionService::new(feed, ledger);

    match args.command {
        SubscriptionsCommands::Add {
            channel,
            account,
            top_level,
            replies,
            reposts,
            json,
        } => {
            let filter = SubscriptionFilter {
                top_level,
                replies,
                reposts,
            };
            let outcome = service.add(&channel, &account, filter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                let verb = match outcome.outcome {
                    UpsertOutcome::Created => "Subscribed",
                    UpsertOutcome::Updated => "Updated subscription of",
                };
                println!(
                    "{} channel {} to @{} ({})",
                    verb, channel, outcome.profile.handle, outcome.profile.did
                );
                println!("  {}", describe_filter(&outcome.filter));
            }
        }
        SubscriptionsCommands::Remove {
            channel,
            account,
            json,
        } => {
            let outcome = service.remove(&channel, &account).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("Unsubscribed channel {} from {}", channel, outcome.did);
                if outcome.account_untracked {
                    println!("  No subscriptions left; account is no longer tracked");
                } else {
                    println!("  {} other subscription(s) remain", outcome.remaining);
                }
            }
        }
        SubscriptionsCommands::List { channel, json } => {
            let listed = service.list_with_handles(&channel).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else {
                print_list(&channel, &listed);
            }
        }
    }

    Ok(())
}

fn describe_filter(filter: &SubscriptionFilter) -> String {
    let flag = |on: bool| if on { "yes" } else { "no" };
    format!(
        "top-level: {}, replies: {}, reposts: {}",
        flag(filter.top_level),
        flag(filter.replies),
        flag(filter.reposts)
    )
}

fn print_list(channel: &str, listed: &[ListedSubscription]) {
    if listed.is_empty() {
        println!("Channel {} has no subscriptions", channel);
        return;
    }

    println!("Subscriptions for channel {}:", channel);
    for entry in listed {
        let name = entry
            .handle
            .as_deref()
            .map(|handle| format!("@{handle}"))
            .unwrap_or_else(|| entry.subscription.did.clone());
        println!(
            "  {} ({}) - {}",
            name,
            entry.subscription.did,
            describe_filter(&entry.subscription.filter)
        );
    }
}
