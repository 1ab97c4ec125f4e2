//! Custody Ledger
//!
//! In-memory per-user token balances with atomic validate+apply.
//!
//! # Guarantees
//!
//! - A balance is never negative.
//! - A transaction id is applied at most once; re-executing it returns the
//!   recorded receipt (idempotent replay).
//! - Tokens outside the registry are rejected, never created implicitly.
//! - Debit, credit and marking the id applied happen under one write lock, so
//!   readers never observe a partially applied transaction.
//!
//! # Example
//!
//! ```rust
//! use custody_domain::{Amount, Instruction, InstructionKind, TokenRef};
//! use custody_ledger::{Ledger, TokenRegistry};
//! use rust_decimal_macros::dec;
//!
//! let sol = TokenRef::new("SOL", "So11111111111111111111111111111111111111112", 9).unwrap();
//! let usdc = TokenRef::new("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6).unwrap();
//! let ledger = Ledger::new(TokenRegistry::with_tokens([sol.clone(), usdc.clone()]).unwrap());
//! ledger.deposit("alice", "SOL", dec!(10)).unwrap();
//!
//! let swap = Instruction::new(
//!     InstructionKind::Swap,
//!     sol,
//!     usdc,
//!     Amount::new(dec!(10)).unwrap(),
//!     Some(Amount::new(dec!(1500)).unwrap()),
//! )
//! .unwrap();
//!
//! let receipt = ledger.execute("tx-1", "alice", &swap).unwrap();
//! assert_eq!(receipt.balances["USDC"], dec!(1500));
//! ```

#![warn(clippy::all)]

mod error;
mod fingerprint;
mod ledger;
mod registry;

pub use error::{LedgerError, LedgerResult};
pub use fingerprint::instruction_fingerprint;
pub use ledger::{Ledger, LedgerReceipt};
pub use registry::TokenRegistry;
