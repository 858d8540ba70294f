//! In-memory ledger for tests and throwaway runs

use async_trait::async_trait;
use skyrelay_domain::{
    ChannelSubscription, ClaimOutcome, LedgerError, LedgerStore, PostKind, ProcessedPost,
    RemovalOutcome, SubscriptionFilter, TrackedAccount, UpsertOutcome,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use time::OffsetDateTime;

#[derive(Default)]
struct State {
    accounts: BTreeMap<String, Option<OffsetDateTime>>,
    /// Keyed by (did, channel_id)
    subscriptions: BTreeMap<(String, String), SubscriptionFilter>,
    /// Post URI -> (claim sequence, record)
    processed: HashMap<String, (u64, ProcessedPost)>,
    next_seq: u64,
}

/// In-memory ledger implementation.
///
/// One lock guards all three tables, so every call is atomic.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, LedgerError> {
        self.state
            .read()
            .map_err(|e| LedgerError::Database(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, LedgerError> {
        self.state
            .write()
            .map_err(|e| LedgerError::Database(e.to_string()))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn tracked_accounts(&self) -> Result<Vec<TrackedAccount>, LedgerError> {
        let state = self.read()?;
        Ok(state
            .accounts
            .iter()
            .map(|(did, last_checked_at)| TrackedAccount {
                did: did.clone(),
                last_checked_at: *last_checked_at,
            })
            .collect())
    }

    async fn tracked_account(&self, did: &str) -> Result<Option<TrackedAccount>, LedgerError> {
        let state = self.read()?;
        Ok(state.accounts.get(did).map(|last_checked_at| TrackedAccount {
            did: did.to_string(),
            last_checked_at: *last_checked_at,
        }))
    }

    async fn advance_watermark(&self, did: &str, at: OffsetDateTime) -> Result<bool, LedgerError> {
        let mut state = self.write()?;
        let Some(current) = state.accounts.get_mut(did) else {
            return Ok(false);
        };
        if current.is_none_or(|existing| existing < at) {
            *current = Some(at);
        }
        Ok(true)
    }

    async fn try_claim(&self, post: &ProcessedPost) -> Result<ClaimOutcome, LedgerError> {
        let mut state = self.write()?;
        if state.processed.contains_key(&post.post_uri) {
            return Ok(ClaimOutcome::Duplicate);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .processed
            .insert(post.post_uri.clone(), (seq, post.clone()));
        Ok(ClaimOutcome::Novel)
    }

    async fn is_processed(&self, post_uri: &str) -> Result<bool, LedgerError> {
        Ok(self.read()?.processed.contains_key(post_uri))
    }

    async fn subscribers(&self, did: &str, kind: PostKind) -> Result<Vec<String>, LedgerError> {
        let state = self.read()?;
        Ok(state
            .subscriptions
            .iter()
            .filter(|((sub_did, _), filter)| sub_did == did && filter.accepts(kind))
            .map(|((_, channel_id), _)| channel_id.clone())
            .collect())
    }

    async fn upsert_subscription(
        &self,
        subscription: &ChannelSubscription,
    ) -> Result<UpsertOutcome, LedgerError> {
        let mut state = self.write()?;
        state
            .accounts
            .entry(subscription.did.clone())
            .or_insert(None);
        let previous = state.subscriptions.insert(
            (subscription.did.clone(), subscription.channel_id.clone()),
            subscription.filter,
        );
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        })
    }

    async fn remove_subscription(
        &self,
        did: &str,
        channel_id: &str,
    ) -> Result<RemovalOutcome, LedgerError> {
        let mut state = self.write()?;
        let removed = state
            .subscriptions
            .remove(&(did.to_string(), channel_id.to_string()))
            .is_some();
        let remaining = state
            .subscriptions
            .keys()
            .filter(|(sub_did, _)| sub_did == did)
            .count() as u64;

        let account_untracked = removed && remaining == 0;
        if account_untracked {
            state.accounts.remove(did);
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
        let state = self.read()?;
        Ok(state
            .subscriptions
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
        let mut state = self.write()?;
        let mut owned: Vec<(u64, String)> = state
            .processed
            .iter()
            .filter(|(_, (_, post))| post.did == did)
            .map(|(uri, (seq, _))| (*seq, uri.clone()))
            .collect();
        owned.sort_unstable();

        let excess = owned.len().saturating_sub(keep);
        for (_, uri) in owned.into_iter().take(excess) {
            state.processed.remove(&uri);
        }
        Ok(excess as u64)
    }
}
