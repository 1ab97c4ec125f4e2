//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for resolved transactions.
//! Implementations can be a relational store, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use custody_domain::{BalanceSnapshot, Transaction, TransactionResult, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A resolved transaction as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub result: TransactionResult,
    pub recorded_at: DateTime<Utc>,
}

/// One persisted balance: (user, token symbol, balance)
pub type BalanceRecord = (UserId, String, Decimal);

/// Repository for resolved transactions (history)
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persist a `Completed` or `Failed` transaction with its result.
    ///
    /// A completed transaction is final: recording the same id again is a
    /// `Duplicate` error. A failed one may be superseded.
    async fn record(
        &self,
        transaction: &Transaction,
        result: &TransactionResult,
    ) -> Result<(), StoreError>;

    /// Find a transaction by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<TransactionRecord>, StoreError>;

    /// All transactions requested by a user, oldest first
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// Repository for balances used to re-seed the ledger
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// Upsert the given balances of a user
    async fn save_snapshot(&self, user_id: &str, balances: &BalanceSnapshot) -> Result<(), StoreError>;

    /// Every persisted balance
    async fn load_all(&self) -> Result<Vec<BalanceRecord>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get transaction repository
    fn transactions(&self) -> &dyn TransactionRepository;

    /// Get balance repository
    fn balances(&self) -> &dyn BalanceRepository;
}
