//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use time::OffsetDateTime;

/// Classification of a feed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    /// An original post that is not a reply
    TopLevel,
    /// A reply to another post
    Reply,
    /// Another post surfaced through a repost action
    Repost,
}

impl PostKind {
    pub const ALL: [PostKind; 3] = [PostKind::TopLevel, PostKind::Reply, PostKind::Repost];

    /// Stable name used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::TopLevel => "top_level",
            PostKind::Reply => "reply",
            PostKind::Repost => "repost",
        }
    }

    /// Parse the stored name back into a kind
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "top_level" => Some(PostKind::TopLevel),
            "reply" => Some(PostKind::Reply),
            "repost" => Some(PostKind::Repost),
            _ => None,
        }
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account as it appears on a feed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Stable account identifier (DID)
    pub did: String,
    /// Current handle, e.g. `alice.bsky.social`
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

impl Author {
    /// Display name, falling back to the handle when unset or blank
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.handle,
        }
    }
}

/// What a rich-text span points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FacetFeature {
    Link { uri: String },
    Mention { did: String },
    Tag { tag: String },
}

/// A rich-text span over the post text, addressed in UTF-8 bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub byte_start: usize,
    pub byte_end: usize,
    pub feature: FacetFeature,
}

/// Marker present when a post replies to another post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub parent_uri: String,
    pub root_uri: String,
}

/// Present when the item reached the feed through a repost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostReason {
    /// The account that performed the repost
    pub by: Author,
    #[serde(with = "time::serde::rfc3339")]
    pub indexed_at: OffsetDateTime,
    /// AT URI of the repost record itself, when the AppView reports it
    #[serde(default)]
    pub uri: Option<String>,
}

/// An image attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default)]
    pub alt: String,
}

/// One entry of an account's activity feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// AT URI of the post, e.g. `at://did:plc:.../app.bsky.feed.post/3k...`
    pub uri: String,
    pub author: Author,
    #[serde(with = "time::serde::rfc3339")]
    pub indexed_at: OffsetDateTime,
    pub text: String,
    #[serde(default)]
    pub facets: Vec<Facet>,
    pub reply: Option<ReplyRef>,
    pub reason: Option<RepostReason>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl FeedItem {
    /// When this item entered the feed. Reposts are ordered by the repost time.
    pub fn observed_at(&self) -> OffsetDateTime {
        self.reason
            .as_ref()
            .map(|reason| reason.indexed_at)
            .unwrap_or(self.indexed_at)
    }

    /// Key the item is claimed under in the processed-post ledger.
    ///
    /// A repost is keyed by its repost record, or by post and reposter when
    /// the record URI is unknown, never by the reposted post.
    pub fn dedup_key(&self) -> Cow<'_, str> {
        match &self.reason {
            None => Cow::Borrowed(&self.uri),
            Some(RepostReason { uri: Some(uri), .. }) if !uri.is_empty() => Cow::Borrowed(uri),
            Some(reason) => Cow::Owned(format!("{}#repost:{}", self.uri, reason.by.did)),
        }
    }

    /// Record key: the last path segment of the AT URI
    pub fn rkey(&self) -> Option<&str> {
        self.uri
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty() && !segment.starts_with("at:"))
    }
}

/// Output of the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: PostKind,
    /// Account credited for the item when matching subscriptions
    pub attributed_actor: String,
}

/// Per-channel filter flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub top_level: bool,
    pub replies: bool,
    pub reposts: bool,
}

impl SubscriptionFilter {
    /// Whether a post of `kind` should be delivered
    pub fn accepts(&self, kind: PostKind) -> bool {
        match kind {
            PostKind::TopLevel => self.top_level,
            PostKind::Reply => self.replies,
            PostKind::Repost => self.reposts,
        }
    }
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self {
            top_level: true,
            replies: false,
            reposts: false,
        }
    }
}

/// An account polled on behalf of at least one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAccount {
    pub did: String,
    /// Indexed time of the newest item seen, unset until the first poll
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_checked_at: Option<OffsetDateTime>,
}

/// A channel's subscription to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub did: String,
    pub channel_id: String,
    pub filter: SubscriptionFilter,
}

/// Dedup record for a post that went through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedPost {
    pub post_uri: String,
    /// Attributed actor
    pub did: String,
    pub kind: PostKind,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
}

/// Result of a dedup claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First time this URI was seen; the record is now persisted
    Novel,
    /// Already processed earlier
    Duplicate,
}

/// Resolved account profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
}

/// Whether an upsert created a subscription or rewrote its filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Result of deleting a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOutcome {
    /// False when no such subscription existed
    pub removed: bool,
    /// Subscriptions left for the account
    pub remaining: u64,
    /// True when the account was dropped from tracking
    pub account_untracked: bool,
}

/// Rendered notification handed to a dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub post_uri: String,
    pub kind: PostKind,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub author_url: String,
    pub description: String,
    pub post_url: String,
    pub footer: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub image_url: Option<String>,
    pub color: u32,
}

/// Counters for one account within a tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    pub items_seen: usize,
    pub novel: usize,
    pub skipped_malformed: usize,
    pub dispatched: usize,
    pub dispatch_failures: usize,
    pub watermark: Option<OffsetDateTime>,
}

/// Counters for a whole tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub accounts_polled: usize,
    pub accounts_failed: usize,
    pub items_seen: usize,
    pub novel: usize,
    pub skipped_malformed: usize,
    pub dispatched: usize,
    pub dispatch_failures: usize,
    pub pruned: u64,
}

impl PollReport {
    pub(crate) fn absorb(&mut self, account: &AccountReport) {
        self.accounts_polled += 1;
        self.items_seen += account.items_seen;
        self.novel += account.novel;
        self.skipped_malformed += account.skipped_malformed;
        self.dispatched += account.dispatched;
        self.dispatch_failures += account.dispatch_failures;
    }
}
