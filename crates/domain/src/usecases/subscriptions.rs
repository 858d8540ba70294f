//! Subscription management - add, remove and list channel subscriptions

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::{
    model::{ChannelSubscription, Profile, SubscriptionFilter, UpsertOutcome},
    ports::{FeedClient, FeedError, LedgerError, LedgerStore},
};

static DID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(did:plc:[a-z2-7]{24}|did:web:[a-zA-Z0-9.-]+(%3A[0-9]+)?(:[a-zA-Z0-9._-]+)*)$")
        .unwrap_or_else(|e| panic!("invalid DID pattern: {e}"))
});

static HANDLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@?[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$")
        .unwrap_or_else(|e| panic!("invalid handle pattern: {e}"))
});

/// A user-supplied account identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
    Did(String),
    /// Handle without the leading `@`
    Handle(String),
}

impl AccountRef {
    /// Parse a DID or handle. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, SubscriptionError> {
        let trimmed = input.trim();
        if DID_PATTERN.is_match(trimmed) {
            return Ok(Self::Did(trimmed.to_string()));
        }
        if HANDLE_PATTERN.is_match(trimmed) {
            let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);
            return Ok(Self::Handle(handle.to_lowercase()));
        }
        Err(SubscriptionError::InvalidIdentifier(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Did(did) => did,
            Self::Handle(handle) => handle,
        }
    }
}

/// Errors returned to whoever manages subscriptions
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Not a valid DID or handle: {0}")]
    InvalidIdentifier(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Channel {channel_id} is not subscribed to {did}")]
    NotSubscribed { channel_id: String, did: String },
    #[error("Feed error: {0}")]
    Feed(FeedError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<FeedError> for SubscriptionError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::NotFound(actor) => Self::AccountNotFound(actor),
            other => Self::Feed(other),
        }
    }
}

/// Result of `add`
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeOutcome {
    pub profile: Profile,
    pub filter: SubscriptionFilter,
    pub outcome: UpsertOutcome,
}

/// Result of `remove`
#[derive(Debug, Clone, Serialize)]
pub struct RemoveOutcome {
    pub did: String,
    pub remaining: u64,
    pub account_untracked: bool,
}

/// A subscription with the account's current handle, when it could be looked up
#[derive(Debug, Clone, Serialize)]
pub struct ListedSubscription {
    #[serde(flatten)]
    pub subscription: ChannelSubscription,
    pub handle: Option<String>,
}

/// Manages which channels follow which accounts
pub struct SubscriptionService<F: FeedClient + ?Sized, L: LedgerStore + ?Sized> {
    feed: Arc<F>,
    ledger: Arc<L>,
}

impl<F: FeedClient + ?Sized, L: LedgerStore + ?Sized> SubscriptionService<F, L> {
    pub fn new(feed: Arc<F>, ledger: Arc<L>) -> Self {
        Self { feed, ledger }
    }

    /// Subscribe a channel to an account, or overwrite the flags of an
    /// existing subscription
    pub async fn add(
        &self,
        channel_id: &str,
        account: &str,
        filter: SubscriptionFilter,
    ) -> Result<SubscribeOutcome, SubscriptionError> {
        let account = AccountRef::parse(account)?;
        let profile = self.feed.resolve_profile(account.as_str()).await?;

        let subscription = ChannelSubscription {
            did: profile.did.clone(),
            channel_id: channel_id.to_string(),
            filter,
        };
        let outcome = self.ledger.upsert_subscription(&subscription).await?;

        tracing::info!(
            channel_id = %channel_id,
            account = %profile.did,
            handle = %profile.handle,
            outcome = ?outcome,
            "Subscription saved"
        );

        Ok(SubscribeOutcome {
            profile,
            filter,
            outcome,
        })
    }

    /// Remove a channel's subscription; the account stops being tracked
    /// when its last subscription goes
    pub async fn remove(
        &self,
        channel_id: &str,
        account: &str,
    ) -> Result<RemoveOutcome, SubscriptionError> {
        let did = match AccountRef::parse(account)? {
            AccountRef::Did(did) => did,
            AccountRef::Handle(handle) => self.feed.resolve_profile(&handle).await?.did,
        };

        let removal = self.ledger.remove_subscription(&did, channel_id).await?;
        if !removal.removed {
            return Err(SubscriptionError::NotSubscribed {
                channel_id: channel_id.to_string(),
                did,
            });
        }

        tracing::info!(
            channel_id = %channel_id,
            account = %did,
            remaining = removal.remaining,
            untracked = removal.account_untracked,
            "Subscription removed"
        );

        Ok(RemoveOutcome {
            did,
            remaining: removal.remaining,
            account_untracked: removal.account_untracked,
        })
    }

    /// A channel's subscriptions, ordered by DID
    pub async fn list(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelSubscription>, SubscriptionError> {
        let mut subscriptions = self.ledger.channel_subscriptions(channel_id).await?;
        subscriptions.sort_by(|a, b| a.did.cmp(&b.did));
        Ok(subscriptions)
    }

    /// Like `list`, with handles looked up in one batch. A failed lookup
    /// leaves the handles empty rather than failing the listing.
    pub async fn list_with_handles(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ListedSubscription>, SubscriptionError> {
        let subscriptions = self.list(channel_id).await?;
        if subscriptions.is_empty() {
            return Ok(Vec::new());
        }

        let dids: Vec<String> = subscriptions.iter().map(|s| s.did.clone()).collect();
        let handles: HashMap<String, String> = match self.feed.resolve_profiles(&dids).await {
            Ok(profiles) => profiles.into_iter().map(|p| (p.did, p.handle)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to look up handles");
                HashMap::new()
            }
        };

        Ok(subscriptions
            .into_iter()
            .map(|subscription| {
                let handle = handles.get(&subscription.did).cloned();
                ListedSubscription {
                    subscription,
                    handle,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFeed, FakeLedger};
    use std::sync::atomic::Ordering;

    const ALICE: &str = "did:plc:abcdefghijklmnopqrstuvwx";
    const BOB: &str = "did:plc:bbbbbbbbbbbbbbbbbbbbbbbb";

    fn service() -> (
        Arc<FakeFeed>,
        Arc<FakeLedger>,
        SubscriptionService<FakeFeed, FakeLedger>,
    ) {
        let feed = Arc::new(FakeFeed::default());
        let ledger = Arc::new(FakeLedger::default());
        feed.add_profile(ALICE, "alice.bsky.social");
        feed.add_profile(BOB, "bob.example.com");
        let service = SubscriptionService::new(Arc::clone(&feed), Arc::clone(&ledger));
        (feed, ledger, service)
    }

    #[test]
    fn test_parse_account_refs() {
        assert_eq!(
            AccountRef::parse(ALICE).unwrap(),
            AccountRef::Did(ALICE.to_string())
        );
        assert_eq!(
            AccountRef::parse("did:web:example.com").unwrap(),
            AccountRef::Did("did:web:example.com".to_string())
        );
        assert_eq!(
            AccountRef::parse("@Alice.bsky.social").unwrap(),
            AccountRef::Handle("alice.bsky.social".to_string())
        );
        assert_eq!(
            AccountRef::parse(" bob.example.com ").unwrap(),
            AccountRef::Handle("bob.example.com".to_string())
        );

        // did:web encodes a port as %3A; a colon starts a path segment
        for did in [
            "did:web:localhost%3A8080",
            "did:web:example.com:user:alice",
            "did:web:example.com%3A8443:u",
        ] {
            assert_eq!(
                AccountRef::parse(did).unwrap(),
                AccountRef::Did(did.to_string())
            );
        }

        for bad in [
            "",
            "alice",
            "did:plc:short",
            "did:key:zabc",
            "@.com",
            "bob.c0m",
            "a b.com",
            "did:web:",
            "did:web:example.com%3Ahttp",
            "did:web:example.com:",
        ] {
            assert!(
                matches!(
                    AccountRef::parse(bad),
                    Err(SubscriptionError::InvalidIdentifier(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_add_resolves_handle_and_tracks_account() {
        let (_feed, ledger, service) = service();

        let outcome = service
            .add("chan-1", "@alice.bsky.social", SubscriptionFilter::default())
            .await
            .unwrap();

        assert_eq!(outcome.profile.did, ALICE);
        assert_eq!(outcome.outcome, UpsertOutcome::Created);
        assert!(ledger.tracked_account(ALICE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_existing_subscription_overwrites_flags() {
        let (_feed, ledger, service) = service();
        service
            .add("chan-1", ALICE, SubscriptionFilter::default())
            .await
            .unwrap();

        let replies_only = SubscriptionFilter {
            top_level: false,
            replies: true,
            reposts: false,
        };
        let outcome = service.add("chan-1", ALICE, replies_only).await.unwrap();

        assert_eq!(outcome.outcome, UpsertOutcome::Updated);
        let subscriptions = ledger.channel_subscriptions("chan-1").await.unwrap();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].filter, replies_only);
    }

    #[tokio::test]
    async fn test_invalid_identifier_makes_no_lookup() {
        let (feed, _ledger, service) = service();

        let result = service
            .add("chan-1", "not an account", SubscriptionFilter::default())
            .await;

        assert!(matches!(result, Err(SubscriptionError::InvalidIdentifier(_))));
        assert_eq!(feed.profile_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_unknown_account() {
        let (_feed, ledger, service) = service();

        let result = service
            .add("chan-1", "ghost.bsky.social", SubscriptionFilter::default())
            .await;

        assert!(matches!(result, Err(SubscriptionError::AccountNotFound(_))));
        assert!(ledger.tracked_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_untracks_after_last_subscription() {
        let (feed, ledger, service) = service();
        service
            .add("chan-1", ALICE, SubscriptionFilter::default())
            .await
            .unwrap();
        service
            .add("chan-2", ALICE, SubscriptionFilter::default())
            .await
            .unwrap();
        let lookups_before = feed.profile_lookups.load(Ordering::SeqCst);

        let first = service.remove("chan-1", ALICE).await.unwrap();
        assert_eq!(first.remaining, 1);
        assert!(!first.account_untracked);
        // DIDs are used without a lookup
        assert_eq!(feed.profile_lookups.load(Ordering::SeqCst), lookups_before);

        let second = service.remove("chan-2", "alice.bsky.social").await.unwrap();
        assert_eq!(second.remaining, 0);
        assert!(second.account_untracked);
        assert!(ledger.tracked_account(ALICE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_missing_subscription() {
        let (_feed, _ledger, service) = service();

        let result = service.remove("chan-1", BOB).await;

        assert!(matches!(
            result,
            Err(SubscriptionError::NotSubscribed { ref did, .. }) if did == BOB
        ));
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_carries_handles() {
        let (_feed, _ledger, service) = service();
        service
            .add("chan-1", BOB, SubscriptionFilter::default())
            .await
            .unwrap();
        service
            .add("chan-1", ALICE, SubscriptionFilter::default())
            .await
            .unwrap();
        service
            .add("chan-2", BOB, SubscriptionFilter::default())
            .await
            .unwrap();

        let listed = service.list_with_handles("chan-1").await.unwrap();

        let dids: Vec<_> = listed.iter().map(|l| l.subscription.did.as_str()).collect();
        assert_eq!(dids, vec![ALICE, BOB]);
        assert_eq!(listed[0].handle.as_deref(), Some("alice.bsky.social"));
        assert!(service.list("chan-3").await.unwrap().is_empty());
    }
}
