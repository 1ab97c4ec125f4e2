//! Custody Storage Layer
//!
//! Durable record of resolved transactions and the balances needed to
//! re-seed the ledger after a restart.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing and development
//!
//! # Usage
//!
//! ```rust
//! use custody_store::{BalanceRepository, MemoryStore, Store};
//! use rust_decimal_macros::dec;
//! use std::collections::BTreeMap;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let snapshot = BTreeMap::from([("SOL".to_string(), dec!(10))]);
//!     store.balances().save_snapshot("alice", &snapshot).await.unwrap();
//!
//!     let records = store.balances().load_all().await.unwrap();
//!     assert_eq!(records.len(), 1);
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{BalanceRecord, BalanceRepository, Store, TransactionRecord, TransactionRepository};
