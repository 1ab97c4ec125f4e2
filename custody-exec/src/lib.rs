//! Custody Execution Layer
//!
//! Turns an approved transaction into a ledger mutation.
//!
//! # Architecture
//!
//! ```text
//! Approved Transaction → ExecutionAdapter → Quote resolution → Ledger → Result
//! ```
//!
//! # Components
//!
//! - **Ports**: Trait for the price-quote source
//! - **ExecutionAdapter**: Resolves amounts, applies via the ledger, maps errors
//! - **Stub**: Configurable quote source for development and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use custody_exec::{ExecutionAdapter, StubQuotes};
//! use custody_ledger::{Ledger, TokenRegistry};
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(Ledger::new(registry));
//! let quotes = Arc::new(StubQuotes::new());
//! let adapter = ExecutionAdapter::new(ledger, quotes);
//!
//! let result = adapter.execute(&transaction).await;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use executor::{ExecutionAdapter, DEFAULT_QUOTE_TIMEOUT};
pub use ports::QuotePort;
pub use stub::StubQuotes;
