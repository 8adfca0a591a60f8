//! 2D lottery ledger
//!
//! Balances, wagers and settlement for a two-digit numbers game with two
//! draws a day. All state lives in a versioned key-value store and every
//! multi-record change is one conditioned atomic commit.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod optimistic;
pub mod services;
pub mod storage;
pub mod wager_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ConfigLoader, LedgerConfig};
pub use errors::{LedgerError, LedgerResult};
pub use services::{LedgerServices, ServiceBuilder};
