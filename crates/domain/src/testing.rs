//! Fakes shared by the use case tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

use crate::model::{
    Author, ChannelSubscription, ClaimOutcome, FeedItem, Notification, PostKind, ProcessedPost,
    Profile, RemovalOutcome, ReplyRef, RepostReason, SubscriptionFilter, TrackedAccount,
    UpsertOutcome,
};
use crate::ports::{
    Clock, DispatchError, Dispatcher, FeedClient, FeedError, LedgerError, LedgerStore,
};

pub(crate) fn author(did: &str) -> Author {
    Author {
        did: did.to_string(),
        handle: format!("{}.bsky.social", did.rsplit(':').next().unwrap_or(did)),
        display_name: None,
        avatar: None,
    }
}

pub(crate) fn top_level(did: &str, rkey: &str, at: OffsetDateTime) -> FeedItem {
    FeedItem {
        uri: format!("at://{did}/app.bsky.feed.post/{rkey}"),
        author: author(did),
        indexed_at: at,
        text: format!("post {rkey}"),
        facets: vec![],
        reply: None,
        reason: None,
        images: vec![],
    }
}

pub(crate) fn reply(did: &str, rkey: &str, at: OffsetDateTime) -> FeedItem {
    let mut item = top_level(did, rkey, at);
    item.reply = Some(ReplyRef {
        parent_uri: "at://did:plc:parent/app.bsky.feed.post/p".to_string(),
        root_uri: "at://did:plc:parent/app.bsky.feed.post/p".to_string(),
    });
    item
}

pub(crate) fn repost(
    reposter: &str,
    original_author: &str,
    rkey: &str,
    at: OffsetDateTime,
) -> FeedItem {
    let mut item = top_level(original_author, rkey, at);
    item.reason = Some(RepostReason {
        by: author(reposter),
        indexed_at: at,
        uri: Some(format!("at://{reposter}/app.bsky.feed.repost/{rkey}")),
    });
    item
}

#[derive(Default)]
pub(crate) struct FakeLedger {
    pub accounts: Mutex<BTreeMap<String, Option<OffsetDateTime>>>,
    pub subscriptions: Mutex<BTreeMap<(String, String), SubscriptionFilter>>,
    pub processed: Mutex<HashMap<String, ProcessedPost>>,
    pub claim_calls: AtomicUsize,
    /// Accounts whose watermark write fails
    pub broken_watermarks: Mutex<HashSet<String>>,
}

impl FakeLedger {
    pub fn subscribe(&self, did: &str, channel_id: &str, filter: SubscriptionFilter) {
        self.accounts
            .lock()
            .unwrap()
            .entry(did.to_string())
            .or_insert(None);
        self.subscriptions
            .lock()
            .unwrap()
            .insert((did.to_string(), channel_id.to_string()), filter);
    }

    pub fn watermark(&self, did: &str) -> Option<OffsetDateTime> {
        self.accounts.lock().unwrap().get(did).copied().flatten()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.lock().unwrap().len()
    }

    pub fn claims(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for FakeLedger {
    async fn tracked_accounts(&self) -> Result<Vec<TrackedAccount>, LedgerError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .map(|(did, last_checked_at)| TrackedAccount {
                did: did.clone(),
                last_checked_at: *last_checked_at,
            })
            .collect())
    }

    async fn tracked_account(&self, did: &str) -> Result<Option<TrackedAccount>, LedgerError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(did)
            .map(|last_checked_at| TrackedAccount {
                did: did.to_string(),
                last_checked_at: *last_checked_at,
            }))
    }

    async fn advance_watermark(&self, did: &str, at: OffsetDateTime) -> Result<bool, LedgerError> {
        if self.broken_watermarks.lock().unwrap().contains(did) {
            return Err(LedgerError::Database("disk I/O error".to_string()));
        }
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(did) {
            Some(current) => {
                if current.is_none_or(|existing| existing < at) {
                    *current = Some(at);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_claim(&self, post: &ProcessedPost) -> Result<ClaimOutcome, LedgerError> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        let mut processed = self.processed.lock().unwrap();
        if processed.contains_key(&post.post_uri) {
            return Ok(ClaimOutcome::Duplicate);
        }
        processed.insert(post.post_uri.clone(), post.clone());
        Ok(ClaimOutcome::Novel)
    }

    async fn is_processed(&self, post_uri: &str) -> Result<bool, LedgerError> {
        Ok(self.processed.lock().unwrap().contains_key(post_uri))
    }

    async fn subscribers(&self, did: &str, kind: PostKind) -> Result<Vec<String>, LedgerError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|((sub_did, _), filter)| sub_did == did && filter.accepts(kind))
            .map(|((_, channel_id), _)| channel_id.clone())
            .collect())
    }

    async fn upsert_subscription(
        &self,
        subscription: &ChannelSubscription,
    ) -> Result<UpsertOutcome, LedgerError> {
        self.accounts
            .lock()
            .unwrap()
            .entry(subscription.did.clone())
            .or_insert(None);
        let previous = self.subscriptions.lock().unwrap().insert(
            (subscription.did.clone(), subscription.channel_id.clone()),
            subscription.filter,
        );
        Ok(if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    async fn remove_subscription(
        &self,
        did: &str,
        channel_id: &str,
    ) -> Result<RemovalOutcome, LedgerError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let removed = subscriptions
            .remove(&(did.to_string(), channel_id.to_string()))
            .is_some();
        let remaining = subscriptions.keys().filter(|(d, _)| d == did).count() as u64;
        let account_untracked = removed && remaining == 0;
        if account_untracked {
            self.accounts.lock().unwrap().remove(did);
        }
        Ok(RemovalOutcome {
            removed,
            remaining,
            account_untracked,
        })
    }

    async fn channel_subscriptions(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ChannelSubscription>, LedgerError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|((_, channel), _)| channel == channel_id)
            .map(|((did, channel), filter)| ChannelSubscription {
                did: did.clone(),
                channel_id: channel.clone(),
                filter: *filter,
            })
            .collect())
    }

    async fn prune_processed(&self, did: &str, keep: usize) -> Result<u64, LedgerError> {
        let mut processed = self.processed.lock().unwrap();
        let mut owned: Vec<_> = processed
            .values()
            .filter(|post| post.did == did)
            .map(|post| (post.processed_at, post.post_uri.clone()))
            .collect();
        owned.sort();
        let excess = owned.len().saturating_sub(keep);
        for (_, uri) in owned.into_iter().take(excess) {
            processed.remove(&uri);
        }
        Ok(excess as u64)
    }
}

#[derive(Default)]
pub(crate) struct FakeFeed {
    pub pages: Mutex<HashMap<String, Vec<FeedItem>>>,
    pub failing: Mutex<HashSet<String>>,
    pub stalled: Mutex<HashSet<String>>,
    pub profiles: Mutex<HashMap<String, Profile>>,
    pub profile_lookups: AtomicUsize,
    pub limits_seen: Mutex<Vec<usize>>,
}

impl FakeFeed {
    pub fn set_page(&self, did: &str, items: Vec<FeedItem>) {
        self.pages.lock().unwrap().insert(did.to_string(), items);
    }

    pub fn fail(&self, did: &str) {
        self.failing.lock().unwrap().insert(did.to_string());
    }

    pub fn stall(&self, did: &str) {
        self.stalled.lock().unwrap().insert(did.to_string());
    }

    /// Register a profile reachable by both its DID and its handle
    pub fn add_profile(&self, did: &str, handle: &str) {
        let profile = Profile {
            did: did.to_string(),
            handle: handle.to_string(),
            display_name: None,
        };
        let mut profiles = self.profiles.lock().unwrap();
        profiles.insert(did.to_string(), profile.clone());
        profiles.insert(handle.to_string(), profile);
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn recent_items(&self, did: &str, limit: usize) -> Result<Vec<FeedItem>, FeedError> {
        self.limits_seen.lock().unwrap().push(limit);
        if self.failing.lock().unwrap().contains(did) {
            return Err(FeedError::Network("connection reset".to_string()));
        }
        let stalled = self.stalled.lock().unwrap().contains(did);
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let mut items = self
            .pages
            .lock()
            .unwrap()
            .get(did)
            .cloned()
            .unwrap_or_default();
        items.truncate(limit);
        Ok(items)
    }

    async fn resolve_profile(&self, actor: &str) -> Result<Profile, FeedError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .unwrap()
            .get(actor)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(actor.to_string()))
    }

    async fn resolve_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, FeedError> {
        let profiles = self.profiles.lock().unwrap();
        Ok(dids
            .iter()
            .filter_map(|did| profiles.get(did).cloned())
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct RecordingDispatcher {
    pub delivered: Mutex<Vec<(String, Notification)>>,
    pub failing_channels: Mutex<HashSet<String>>,
}

impl RecordingDispatcher {
    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    /// (channel, post uri) pairs in delivery order
    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, n)| (channel.clone(), n.post_uri.clone()))
            .collect()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn deliver(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), DispatchError> {
        if self.failing_channels.lock().unwrap().contains(channel_id) {
            return Err(DispatchError::UnknownChannel(channel_id.to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((channel_id.to_string(), notification.clone()));
        Ok(())
    }

    fn platform(&self) -> &'static str {
        "recording"
    }
}

pub(crate) struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}
