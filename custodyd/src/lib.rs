//! Custody Daemon Library
//!
//! Runtime orchestrator for the simulated custodial wallet.
//!
//! # Architecture
//!
//! ```text
//! Caller → API Server → Broker ──(confirm)──► Execution Adapter → Ledger
//!                          │                         ↑
//!                     Event Bus               Quote source
//!                          ↓
//!                  Confirming party (UI / agent)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Broker**: Single actor serializing confirmation requests (FIFO)
//! - **Agent**: Optional automated confirming party
//! - **Event Bus**: Confirmation notifications
//! - **API**: HTTP endpoints for callers and the confirming party
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use custodyd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod agent;
pub mod api;
pub mod broker;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;

// Re-exports for convenience
pub use agent::AutoConfirmAgent;
pub use broker::{BrokerHandle, ConfirmationView, TransactionBroker};
pub use config::{ApiConfig, BrokerConfig, Config, Environment, LedgerConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{BrokerEvent, EventBus, EventReceiver};
