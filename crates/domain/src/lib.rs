//! skyrelay domain crate
//!
//! Core logic of the feed relay, kept free of I/O:
//! - `model`: feed items, subscriptions and ledger records
//! - `ports`: traits implemented by the adapters crate
//! - `usecases`: classify, dedup, resolve, render, poll, schedule and
//!   subscription management

pub mod model;
pub mod ports;
pub mod usecases;

#[cfg(test)]
mod testing;

pub use model::*;
pub use ports::*;
