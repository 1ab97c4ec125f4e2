//! Ledger errors

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur when validating or applying an instruction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Source balance is lower than the debit
    #[error("Insufficient {symbol} balance for {user}: required {required}, available {available}")]
    InsufficientBalance {
        /// Owner of the balance
        user: String,
        /// Token being debited
        symbol: String,
        /// Amount the instruction debits
        required: Decimal,
        /// Balance at validation time
        available: Decimal,
    },

    /// Token symbol is not in the registry
    #[error("Unknown token: {0}")]
    UnknownToken(String),

    /// Swap reached the ledger without a resolved destination amount
    #[error("Unresolved destination amount for {0}")]
    UnresolvedAmount(String),

    /// Transaction id already applied for a different user or instruction
    #[error("Transaction {0} was already applied with different content")]
    ReplayConflict(String),

    /// Instruction violates a domain invariant
    #[error("Invalid instruction: {0}")]
    InvalidInstruction(#[from] custody_domain::DomainError),

    /// Balance update would overflow the decimal range
    #[error("Balance overflow: {symbol} for {user}")]
    Overflow {
        /// Owner of the balance
        user: String,
        /// Token being credited
        symbol: String,
    },

    /// Seed or deposit value is negative
    #[error("Negative balance for {user}/{symbol}: {value}")]
    NegativeBalance {
        /// Owner of the balance
        user: String,
        /// Token
        symbol: String,
        /// Offending value
        value: Decimal,
    },

    /// Ledger lock poisoned by a panicking writer
    #[error("Ledger lock poisoned: {0}")]
    Poisoned(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
