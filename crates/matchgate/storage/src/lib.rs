//! Matchgate storage abstractions.
//!
//! Three independent durable collections back the service:
//! - counters: monotonic player and session sequences
//! - players: pid -> current credential and rating
//! - matches: session id -> finalized match, insert-once
//!
//! The in-memory adapter is for tests and development. The SQLite adapter
//! (feature `sqlite`) is the durable source of truth.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use traits::{CounterStore, MatchLedger, MatchgateStorage, PlayerLedger};
