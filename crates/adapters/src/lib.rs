//! skyrelay adapters crate
//!
//! Infrastructure adapters implementing the domain ports:
//! - `ledger`: SQLite and in-memory ledgers
//! - `bsky`: Bluesky AppView feed client
//! - `discord`: Discord REST dispatcher
//! - `outbox`: JSONL dispatcher for dry runs

pub mod bsky;
pub mod discord;
mod ledger_memory;
mod ledger_sqlite;
pub mod outbox;

#[cfg(test)]
mod ledger_contract;

/// Re-exports for ledger adapters
pub mod ledger {
    pub use crate::ledger_memory::InMemoryLedger;
    pub use crate::ledger_sqlite::SqliteLedger;
}
