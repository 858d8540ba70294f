//! Poll use case - fetch, classify, dedup and fan out one tick

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use crate::{
    model::{AccountReport, ClaimOutcome, FeedItem, PollReport, ProcessedPost},
    ports::{Clock, Dispatcher, FeedClient, FeedError, LedgerError, LedgerStore},
    usecases::{
        classify::classify,
        dedup::DedupGate,
        render::{RenderConfig, Renderer},
        resolve::SubscriptionResolver,
    },
};

/// Upper bound accepted by the feed API for one page
pub const MAX_PAGE_SIZE: usize = 100;

/// Configuration for the poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Items fetched per account per tick
    pub page_size: usize,
    /// Time allowed for one account's fetch
    pub fetch_timeout: Duration,
    /// Processed posts kept per account after each tick (0 = keep everything)
    pub retention_per_account: usize,
    /// Capacity of the in-memory recent-claims cache (0 = disabled)
    pub dedup_cache_size: usize,
    /// Render config
    pub render_config: RenderConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            fetch_timeout: Duration::from_secs(20),
            retention_per_account: 100,
            dedup_cache_size: 100,
            render_config: RenderConfig::default(),
        }
    }
}

/// Errors that abort one account within a tick
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("Feed request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Runs the poll-dedup-classify-dispatch pipeline
pub struct Poller<F, L, D, Cl>
where
    F: FeedClient + ?Sized,
    L: LedgerStore + ?Sized,
    D: Dispatcher + ?Sized,
    Cl: Clock + ?Sized,
{
    feed: Arc<F>,
    ledger: Arc<L>,
    dispatcher: Arc<D>,
    clock: Arc<Cl>,
    gate: DedupGate<L>,
    resolver: SubscriptionResolver<L>,
    renderer: Renderer,
    config: PollerConfig,
}

impl<F, L, D, Cl> Poller<F, L, D, Cl>
where
    F: FeedClient + ?Sized,
    L: LedgerStore + ?Sized,
    D: Dispatcher + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        feed: Arc<F>,
        ledger: Arc<L>,
        dispatcher: Arc<D>,
        clock: Arc<Cl>,
        config: PollerConfig,
    ) -> Self {
        let gate = DedupGate::new(Arc::clone(&ledger), config.dedup_cache_size);
        let resolver = SubscriptionResolver::new(Arc::clone(&ledger));
        let renderer = Renderer::new(config.render_config.clone());
        Self {
            feed,
            ledger,
            dispatcher,
            clock,
            gate,
            resolver,
            renderer,
            config,
        }
    }

    /// Run a single tick over every tracked account.
    ///
    /// Only failing to list the tracked accounts is an error; per-account
    /// failures are logged and counted.
    pub async fn poll_once(&self) -> Result<PollReport, PollError> {
        let accounts = self.ledger.tracked_accounts().await?;
        let mut report = PollReport::default();
        let mut polled = Vec::with_capacity(accounts.len());

        for account in &accounts {
            match self.poll_account(&account.did).await {
                Ok(account_report) => {
                    report.absorb(&account_report);
                    polled.push(account.did.as_str());
                }
                Err(e) => {
                    report.accounts_failed += 1;
                    tracing::error!(account = %account.did, error = %e, "Failed to poll account");
                    // Continue with other accounts
                }
            }
        }

        if self.config.retention_per_account > 0 {
            // Never prune below one page, or the current page would be re-claimed
            let keep = self
                .config
                .retention_per_account
                .max(self.page_size());
            for did in polled {
                match self.ledger.prune_processed(did, keep).await {
                    Ok(pruned) => report.pruned += pruned,
                    Err(e) => {
                        tracing::warn!(account = %did, error = %e, "Failed to prune processed posts");
                    }
                }
            }
        }

        tracing::info!(
            accounts = accounts.len(),
            failed = report.accounts_failed,
            novel = report.novel,
            dispatched = report.dispatched,
            dispatch_failures = report.dispatch_failures,
            "Poll tick complete"
        );

        Ok(report)
    }

    /// Poll a single account
    pub async fn poll_account(&self, did: &str) -> Result<AccountReport, PollError> {
        let limit = self.page_size();

        tracing::debug!(account = %did, limit, "Fetching feed");

        let items = match timeout(self.config.fetch_timeout, self.feed.recent_items(did, limit)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(PollError::Timeout(self.config.fetch_timeout)),
        };

        let mut report = AccountReport::default();
        let Some(newest) = items.first() else {
            tracing::debug!(account = %did, "No items");
            return Ok(report);
        };
        let watermark = newest.observed_at();
        report.items_seen = items.len();

        // Oldest first, so several novel posts arrive in feed order
        for item in items.iter().rev() {
            self.process_item(item, &mut report).await?;
        }

        if !self.ledger.advance_watermark(did, watermark).await? {
            tracing::debug!(account = %did, "Account untracked during poll");
        }
        report.watermark = Some(watermark);

        tracing::debug!(
            account = %did,
            items = report.items_seen,
            novel = report.novel,
            "Polled account"
        );

        Ok(report)
    }

    fn page_size(&self) -> usize {
        self.config.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Classify, claim, resolve and dispatch one item
    async fn process_item(
        &self,
        item: &FeedItem,
        report: &mut AccountReport,
    ) -> Result<(), PollError> {
        let classification = match classify(item) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed feed item");
                report.skipped_malformed += 1;
                return Ok(());
            }
        };

        let record = ProcessedPost {
            post_uri: item.dedup_key().into_owned(),
            did: classification.attributed_actor.clone(),
            kind: classification.kind,
            processed_at: self.clock.now(),
        };

        if self.gate.try_claim(&record).await? == ClaimOutcome::Duplicate {
            tracing::trace!(post_uri = %record.post_uri, "Already processed");
            return Ok(());
        }
        report.novel += 1;

        // From here on the post counts as processed whatever happens
        let channels = self
            .resolver
            .resolve(&classification.attributed_actor, classification.kind)
            .await?;

        if channels.is_empty() {
            tracing::debug!(
                post_uri = %item.uri,
                kind = %classification.kind,
                "No subscribers for post kind"
            );
            return Ok(());
        }

        let notification = self.renderer.render(item, &classification);
        let deliveries = channels.iter().map(|channel_id| {
            let notification = &notification;
            async move {
                let result = self.dispatcher.deliver(channel_id, notification).await;
                (channel_id, result)
            }
        });

        for (channel_id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => {
                    report.dispatched += 1;
                    tracing::info!(
                        post_uri = %item.uri,
                        channel_id = %channel_id,
                        kind = %classification.kind,
                        platform = self.dispatcher.platform(),
                        "Dispatched notification"
                    );
                }
                Err(e) => {
                    report.dispatch_failures += 1;
                    tracing::error!(
                        post_uri = %item.uri,
                        channel_id = %channel_id,
                        error = %e,
                        "Failed to dispatch notification"
                    );
                }
            }
        }

        Ok(())
    }
}
