//! Custody Engine Layer
//!
//! Pure translation logic, deterministic, no I/O.
//! Takes a declarative `ContractCall` → returns a ledger-executable `Instruction`.

#![warn(clippy::all)]

pub mod pricing;
pub mod translator;

pub use pricing::{apply_rate, convert};
pub use translator::to_instruction;
