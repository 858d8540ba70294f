//! Subscription resolution for a classified post

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    model::PostKind,
    ports::{LedgerError, LedgerStore},
};

/// Looks up which channels want a post of a given kind
pub struct SubscriptionResolver<L: LedgerStore + ?Sized> {
    ledger: Arc<L>,
}

impl<L: LedgerStore + ?Sized> SubscriptionResolver<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Channels subscribed to `did` whose current filter accepts `kind`.
    ///
    /// Flags are read fresh on every call.
    pub async fn resolve(&self, did: &str, kind: PostKind) -> Result<BTreeSet<String>, LedgerError> {
        let channels = self.ledger.subscribers(did, kind).await?;
        Ok(channels.into_iter().collect())
    }
}
