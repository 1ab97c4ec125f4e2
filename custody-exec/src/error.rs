//! Execution layer error types.

use custody_domain::{DomainError, ErrorKind};
use custody_ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Ledger rejected or failed the instruction
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Price resolution failed before reaching the ledger
    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    /// Unexpected failure inside the adapter
    #[error("Execution failed: {0}")]
    Internal(String),
}

impl ExecError {
    /// Caller-facing classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Ledger(LedgerError::InsufficientBalance { .. }) => {
                ErrorKind::InsufficientBalance
            },
            ExecError::Ledger(LedgerError::UnknownToken(_)) => ErrorKind::UnknownToken,
            ExecError::Ledger(LedgerError::UnresolvedAmount(_))
            | ExecError::Ledger(LedgerError::ReplayConflict(_))
            | ExecError::Ledger(LedgerError::InvalidInstruction(_)) => ErrorKind::InvalidInstruction,
            ExecError::Ledger(LedgerError::Overflow { .. })
            | ExecError::Ledger(LedgerError::NegativeBalance { .. })
            | ExecError::Ledger(LedgerError::Poisoned(_)) => ErrorKind::InternalExecutionError,
            ExecError::Domain(DomainError::UnsupportedInstructionType(_)) => {
                ErrorKind::UnsupportedInstructionType
            },
            ExecError::Domain(_) => ErrorKind::InvalidInstruction,
            ExecError::QuoteUnavailable(_) => ErrorKind::QuoteUnavailable,
            ExecError::Internal(_) => ErrorKind::InternalExecutionError,
        }
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
