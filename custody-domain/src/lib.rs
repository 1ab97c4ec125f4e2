//! Custody Domain Layer
//!
//! Pure domain types with zero I/O dependencies: token references, exact
//! amounts, instructions, transactions and the caller-facing result taxonomy.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    BalanceSnapshot, ContractCall, ContractCallParams, ErrorKind, Instruction, InstructionKind,
    Transaction, TransactionEffects, TransactionError, TransactionResult, TransactionStatus,
    TxId, UserId, REJECTED_MESSAGE,
};
pub use value_objects::{
    Amount, DomainError, TokenRef, DEFAULT_TOKEN_DECIMALS, MAX_TOKEN_DECIMALS,
};
