//! Bluesky feed adapters

mod client;
mod schema;

pub use client::{BskyFeedClient, DEFAULT_FEED_FILTER, DEFAULT_SERVICE_URL};

use async_trait::async_trait;
use skyrelay_domain::{FeedClient, FeedError, FeedItem, Profile};
use std::collections::HashMap;
use std::sync::Mutex;

/// Stub feed client serving canned pages
#[derive(Default)]
pub struct StubFeedClient {
    pages: Mutex<HashMap<String, Vec<FeedItem>>>,
    profiles: Vec<Profile>,
}

impl StubFeedClient {
    /// Create an empty stub
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a stub that knows the given profiles
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            profiles,
        }
    }

    /// Replace the page served for an account (newest first)
    pub fn set_page(&self, did: &str, items: Vec<FeedItem>) {
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(did.to_string(), items);
    }
}

#[async_trait]
impl FeedClient for StubFeedClient {
    async fn recent_items(&self, did: &str, limit: usize) -> Result<Vec<FeedItem>, FeedError> {
        let pages = self
            .pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(pages
            .get(did)
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn resolve_profile(&self, actor: &str) -> Result<Profile, FeedError> {
        self.profiles
            .iter()
            .find(|p| p.did == actor || p.handle == actor)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(actor.to_string()))
    }

    async fn resolve_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, FeedError> {
        Ok(self
            .profiles
            .iter()
            .filter(|p| dids.contains(&p.did))
            .cloned()
            .collect())
    }
}
