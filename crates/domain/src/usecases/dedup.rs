//! Dedup gate - decides whether a post is processed for the first time

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    model::{ClaimOutcome, ProcessedPost},
    ports::{LedgerError, LedgerStore},
};

/// Insertion-ordered set of recently seen post URIs.
///
/// When full, the oldest inserted URI is evicted first.
#[derive(Debug)]
pub struct RecentClaims {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecentClaims {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.members.contains(uri)
    }

    /// Remember a URI, returning whatever had to be evicted to make room
    pub fn insert(&mut self, uri: &str) -> Option<String> {
        if self.capacity == 0 || self.members.contains(uri) {
            return None;
        }

        let evicted = if self.order.len() >= self.capacity {
            self.order.pop_front().inspect(|oldest| {
                self.members.remove(oldest);
            })
        } else {
            None
        };

        self.order.push_back(uri.to_string());
        self.members.insert(uri.to_string());
        evicted
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Once-only gate over the ledger's processed-post records
pub struct DedupGate<L: LedgerStore + ?Sized> {
    ledger: Arc<L>,
    recent: Mutex<RecentClaims>,
}

impl<L: LedgerStore + ?Sized> DedupGate<L> {
    /// `cache_size` of zero disables the in-memory layer
    pub fn new(ledger: Arc<L>, cache_size: usize) -> Self {
        Self {
            ledger,
            recent: Mutex::new(RecentClaims::new(cache_size)),
        }
    }

    /// Claim a post. `Novel` is returned at most once per URI, and only after
    /// the processed-post record is committed.
    pub async fn try_claim(&self, post: &ProcessedPost) -> Result<ClaimOutcome, LedgerError> {
        if self.recent().contains(&post.post_uri) {
            tracing::trace!(post_uri = %post.post_uri, "Recent claim cache hit");
            return Ok(ClaimOutcome::Duplicate);
        }

        let outcome = self.ledger.try_claim(post).await?;
        self.recent().insert(&post.post_uri);

        Ok(outcome)
    }

    fn recent(&self) -> MutexGuard<'_, RecentClaims> {
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
