//! Domain Entities for the custody core
//!
//! Intents (`ContractCall`), their resolved form (`Instruction`), the
//! `Transaction` that carries an instruction through confirmation, and the
//! caller-facing `TransactionResult`.

use crate::value_objects::{Amount, DomainError, TokenRef};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Identifiers
// =============================================================================

/// Caller-supplied, globally unique transaction identifier
pub type TxId = String;

/// Identifier of the wallet owner whose balances are affected
pub type UserId = String;

/// Post-state balances keyed by token symbol
pub type BalanceSnapshot = BTreeMap<String, Decimal>;

// =============================================================================
// Instruction
// =============================================================================

/// Closed set of instruction kinds the ledger can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionKind {
    /// Exchange one token for another at a quoted rate
    Swap,
    /// Lock a token into its staked representation (1:1 unless quoted)
    Stake,
}

impl InstructionKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionKind::Swap => "swap",
            InstructionKind::Stake => "stake",
        }
    }
}

impl FromStr for InstructionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "swap" => Ok(InstructionKind::Swap),
            "stake" => Ok(InstructionKind::Stake),
            other => Err(DomainError::UnsupportedInstructionType(other.to_string())),
        }
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved, ledger-executable description of a balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    /// What the instruction does
    #[serde(rename = "type")]
    pub kind: InstructionKind,
    /// Token debited
    pub from_token: TokenRef,
    /// Token credited
    pub to_token: TokenRef,
    /// Exact debit
    pub from_amount: Amount,
    /// Filled in by quote resolution before execution
    #[serde(default)]
    pub to_amount: Option<Amount>,
    /// Free-form context, ignored by the ledger
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Instruction {
    /// Create a new instruction with validation
    ///
    /// # Errors
    /// - `DomainError::InvalidToken` if either token is malformed
    /// - `DomainError::SameToken` if both sides name the same symbol
    pub fn new(
        kind: InstructionKind,
        from_token: TokenRef,
        to_token: TokenRef,
        from_amount: Amount,
        to_amount: Option<Amount>,
    ) -> Result<Self, DomainError> {
        let instruction = Self {
            kind,
            from_token,
            to_token,
            from_amount,
            to_amount,
            metadata: serde_json::Value::Null,
        };
        instruction.validate()?;
        Ok(instruction)
    }

    /// Attach free-form metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Return a copy with `to_amount` resolved
    pub fn with_to_amount(mut self, to_amount: Amount) -> Self {
        self.to_amount = Some(to_amount);
        self
    }

    /// Re-check invariants (instructions may arrive deserialized).
    pub fn validate(&self) -> Result<(), DomainError> {
        self.from_token.validate()?;
        self.to_token.validate()?;
        if self.from_token.symbol == self.to_token.symbol {
            return Err(DomainError::SameToken(self.from_token.symbol.clone()));
        }
        Ok(())
    }

    /// Amount to credit to `to_token`.
    ///
    /// A stake without a quoted amount is 1:1. A swap without a quoted amount
    /// has nothing to credit yet.
    pub fn credit_amount(&self) -> Option<Amount> {
        match (self.kind, self.to_amount) {
            (_, Some(amount)) => Some(amount),
            (InstructionKind::Stake, None) => Some(self.from_amount),
            (InstructionKind::Swap, None) => None,
        }
    }

    /// Whether the ledger can execute this instruction without a quote.
    pub fn is_resolved(&self) -> bool {
        self.credit_amount().is_some()
    }
}

// =============================================================================
// ContractCall
// =============================================================================

/// Declarative intent prior to translation.
///
/// Loosely typed: `kind` is free text and `from_amount` is a plain number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    /// Instruction type name, e.g. "swap"
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable summary
    #[serde(default)]
    pub description: String,
    /// Tokens and amounts
    pub params: ContractCallParams,
    /// Copied onto the resulting instruction
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Parameters of a [`ContractCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCallParams {
    /// Token to debit
    pub from_token: TokenRef,
    /// Token to credit
    pub to_token: TokenRef,
    /// Amount to debit, as a plain number
    pub from_amount: f64,
    /// Authoritative units of `to_token` per unit of `from_token`
    #[serde(default)]
    pub rate: Option<f64>,
}

// =============================================================================
// Transaction
// =============================================================================

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Awaiting the confirming party
    Pending,
    /// Approved, not yet executing
    Confirmed,
    /// Ledger mutation in progress
    Executing,
    /// Applied to the ledger
    Completed,
    /// Ended without being applied
    Failed,
    /// Declined by the confirming party (or timed out)
    Rejected,
}

impl TransactionStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Rejected
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Failed)
                | (Pending, Completed)
                | (Confirmed, Executing)
                | (Confirmed, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An instruction on its way through confirmation and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Caller-supplied unique id
    pub id: TxId,
    /// Shown to the confirming party
    pub description: String,
    /// Owner of the affected balances
    pub requested_by: UserId,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Balance change to apply
    pub instruction: Instruction,
    /// Lifecycle position
    pub status: TransactionStatus,
}

impl Transaction {
    /// Create a pending transaction
    ///
    /// # Errors
    /// Returns `DomainError::MissingField` if `id` or `requested_by` is empty.
    pub fn new(
        id: impl Into<TxId>,
        description: impl Into<String>,
        requested_by: impl Into<UserId>,
        instruction: Instruction,
    ) -> Result<Self, DomainError> {
        let id = id.into();
        let requested_by = requested_by.into();
        if id.trim().is_empty() {
            return Err(DomainError::MissingField("id".to_string()));
        }
        if requested_by.trim().is_empty() {
            return Err(DomainError::MissingField("requestedBy".to_string()));
        }
        Ok(Self {
            id,
            description: description.into(),
            requested_by,
            timestamp: Utc::now(),
            instruction,
            status: TransactionStatus::Pending,
        })
    }

    /// Move to `next`, enforcing the lifecycle state machine.
    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition(format!(
                "{}: {} -> {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

// =============================================================================
// TransactionResult
// =============================================================================

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Debit exceeds the current balance
    InsufficientBalance,
    /// A token is not in the registry
    UnknownToken,
    /// No route for the instruction type
    UnsupportedInstructionType,
    /// Price resolution failed before execution
    QuoteUnavailable,
    /// Declined by the confirming party
    RejectedByUser,
    /// Nobody decided in time
    ConfirmationTimeout,
    /// Malformed or conflicting instruction
    InvalidInstruction,
    /// Unexpected failure inside the core
    InternalExecutionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error half of a failed [`TransactionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionError {
    /// Classification
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
}

/// Balance effects of a completed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEffects {
    /// Post-state balances of the affected tokens
    pub token_balances: BalanceSnapshot,
}

/// Outcome of a transaction request. Every outcome, including rejection and
/// internal failure, is expressed as one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    /// Whether the instruction was applied
    pub success: bool,
    /// Transaction this result belongs to
    pub tx_id: TxId,
    /// Summary of a completed transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Why the transaction did not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransactionError>,
    /// Balance changes of a completed transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<TransactionEffects>,
}

/// Message carried by results declined by the confirming party
pub const REJECTED_MESSAGE: &str = "rejected by confirming party";

impl TransactionResult {
    /// Successful result with post-state balances
    pub fn completed(
        tx_id: impl Into<TxId>,
        message: impl Into<String>,
        token_balances: BalanceSnapshot,
    ) -> Self {
        Self {
            success: true,
            tx_id: tx_id.into(),
            message: Some(message.into()),
            error: None,
            effects: Some(TransactionEffects { token_balances }),
        }
    }

    /// Failed result
    pub fn failed(tx_id: impl Into<TxId>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_id: tx_id.into(),
            message: None,
            error: Some(TransactionError {
                kind,
                message: message.into(),
            }),
            effects: None,
        }
    }

    /// Declined by the confirming party
    pub fn rejected(tx_id: impl Into<TxId>) -> Self {
        Self::failed(tx_id, ErrorKind::RejectedByUser, REJECTED_MESSAGE)
    }

    /// Error kind of a failed result
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sol() -> TokenRef {
        TokenRef::new("SOL", "So11111111111111111111111111111111111111112", 9).unwrap()
    }

    fn usdc() -> TokenRef {
        TokenRef::new("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6).unwrap()
    }

    #[test]
    fn test_instruction_rejects_same_token() {
        let result = Instruction::new(
            InstructionKind::Swap,
            sol(),
            sol(),
            Amount::new(dec!(1)).unwrap(),
            None,
        );
        assert_eq!(result, Err(DomainError::SameToken("SOL".to_string())));
    }

    #[test]
    fn test_credit_amount() {
        let amount = Amount::new(dec!(2)).unwrap();
        let swap = Instruction::new(InstructionKind::Swap, sol(), usdc(), amount, None).unwrap();
        assert_eq!(swap.credit_amount(), None);
        assert!(!swap.is_resolved());

        let quoted = swap.with_to_amount(Amount::new(dec!(300)).unwrap());
        assert_eq!(quoted.credit_amount().unwrap().as_decimal(), dec!(300));

        let stake = Instruction::new(InstructionKind::Stake, sol(), usdc(), amount, None).unwrap();
        assert_eq!(stake.credit_amount(), Some(amount));
    }

    #[test]
    fn test_instruction_kind_parse() {
        assert_eq!("swap".parse::<InstructionKind>().unwrap(), InstructionKind::Swap);
        assert_eq!(" Stake ".parse::<InstructionKind>().unwrap(), InstructionKind::Stake);
        assert_eq!(
            "bridge".parse::<InstructionKind>(),
            Err(DomainError::UnsupportedInstructionType("bridge".to_string()))
        );
    }

    #[test]
    fn test_instruction_wire_format() {
        let instruction = Instruction::new(
            InstructionKind::Swap,
            sol(),
            usdc(),
            Amount::new(dec!(10)).unwrap(),
            Some(Amount::new(dec!(1500)).unwrap()),
        )
        .unwrap();

        let json = serde_json::to_value(&instruction).unwrap();
        assert_eq!(json["type"], "swap");
        assert_eq!(json["fromToken"]["symbol"], "SOL");
        assert_eq!(json["fromAmount"], "10");
        assert_eq!(json["toAmount"], "1500");
    }

    #[test]
    fn test_deserialized_unknown_kind_is_rejected() {
        let json = r#"{
            "type": "bridge",
            "fromToken": {"symbol": "SOL", "address": "a"},
            "toToken": {"symbol": "USDC", "address": "b"},
            "fromAmount": "1"
        }"#;
        assert!(serde_json::from_str::<Instruction>(json).is_err());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let instruction = Instruction::new(
            InstructionKind::Stake,
            sol(),
            usdc(),
            Amount::new(dec!(1)).unwrap(),
            None,
        )
        .unwrap();
        let mut tx = Transaction::new("tx-1", "stake", "alice", instruction).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);

        tx.transition(TransactionStatus::Confirmed).unwrap();
        tx.transition(TransactionStatus::Executing).unwrap();
        tx.transition(TransactionStatus::Completed).unwrap();
        assert!(tx.status.is_terminal());

        let err = tx.transition(TransactionStatus::Executing).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition(_)));
    }

    #[test]
    fn test_transaction_requires_id() {
        let instruction = Instruction::new(
            InstructionKind::Stake,
            sol(),
            usdc(),
            Amount::new(dec!(1)).unwrap(),
            None,
        )
        .unwrap();
        let err = Transaction::new(" ", "stake", "alice", instruction).unwrap_err();
        assert_eq!(err, DomainError::MissingField("id".to_string()));
    }

    #[test]
    fn test_rejected_result() {
        let result = TransactionResult::rejected("tx-9");
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::RejectedByUser));
        assert_eq!(result.error.unwrap().message, REJECTED_MESSAGE);
    }
}
