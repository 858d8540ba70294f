//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{
    ChannelSubscription, ClaimOutcome, FeedItem, Notification, PostKind, ProcessedPost, Profile,
    RemovalOutcome, TrackedAccount, UpsertOutcome,
};

/// Error type for feed client operations
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Account not found: {0}")]
    NotFound(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Port for reading the social feed
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch up to `limit` of the account's most recent items, newest first
    async fn recent_items(&self, did: &str, limit: usize) -> Result<Vec<FeedItem>, FeedError>;

    /// Resolve a DID or handle to a profile
    async fn resolve_profile(&self, actor: &str) -> Result<Profile, FeedError>;

    /// Resolve several DIDs at once; unknown accounts are left out
    async fn resolve_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, FeedError>;
}

/// Error type for ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for the persistent ledger of accounts, subscriptions and processed posts
///
/// Every mutating call is its own transaction.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All tracked accounts, ordered by DID
    async fn tracked_accounts(&self) -> Result<Vec<TrackedAccount>, LedgerError>;

    /// A single tracked account, if present
    async fn tracked_account(&self, did: &str) -> Result<Option<TrackedAccount>, LedgerError>;

    /// Store `max(current, at)` as the account watermark.
    ///
    /// Returns false when the account is no longer tracked.
    async fn advance_watermark(&self, did: &str, at: OffsetDateTime) -> Result<bool, LedgerError>;

    /// Insert the record unless the URI is already present
    async fn try_claim(&self, post: &ProcessedPost) -> Result<ClaimOutcome, LedgerError>;

    /// Whether a processed-post record exists for the URI
    async fn is_processed(&self, post_uri: &str) -> Result<bool, LedgerError>;

    /// Channels subscribed to `did` whose flag for `kind` is set
    async fn subscribers(&self, did: &str, kind: PostKind) -> Result<Vec<String>, LedgerError>;

    /// Track the account if needed and create or overwrite the subscription
    async fn upsert_subscription(
        &self,
        subscription: &ChannelSubscription,
    ) -> Result<UpsertOutcome, LedgerError>;

    /// Delete a subscription, untracking the account when it was the last one
    async fn remove_subscription(
        &self,
        did: &str,
        channel_id: &str,
    ) -> Result<RemovalOutcome, LedgerError>;

    /// Subscriptions held by a channel, ordered by DID
    async fn channel_subscriptions(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelSubscription>, LedgerError>;

    /// Keep only the newest `keep` processed posts attributed to `did`
    async fn prune_processed(&self, did: &str, keep: usize) -> Result<u64, LedgerError>;
}

/// Error type for dispatcher operations
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// Port for delivering notifications to a channel
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver one notification to one channel
    async fn deliver(&self, channel_id: &str, notification: &Notification)
    -> Result<(), DispatchError>;

    /// Get the platform name (e.g., "discord", "outbox")
    fn platform(&self) -> &'static str;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
