//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access.

use crate::error::StoreError;
use crate::repository::{
    BalanceRecord, BalanceRepository, Store, TransactionRecord, TransactionRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use custody_domain::{BalanceSnapshot, Transaction, TransactionResult, TransactionStatus, UserId};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// In-memory store for testing
pub struct MemoryStore {
    transactions: RwLock<HashMap<String, TransactionRecord>>,
    balances: RwLock<BTreeMap<(UserId, String), Decimal>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            balances: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get the number of recorded transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        if let Ok(mut transactions) = self.transactions.write() {
            transactions.clear();
        }
        if let Ok(mut balances) = self.balances.write() {
            balances.clear();
        }
    }

    fn read_transactions(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<String, TransactionRecord>>, StoreError> {
        self.transactions
            .read()
            .map_err(|e| StoreError::Database(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_transactions(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, TransactionRecord>>, StoreError> {
        self.transactions
            .write()
            .map_err(|e| StoreError::Database(format!("Failed to acquire write lock: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Transaction Repository Implementation
// =============================================================================

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn record(
        &self,
        transaction: &Transaction,
        result: &TransactionResult,
    ) -> Result<(), StoreError> {
        if !matches!(transaction.status, TransactionStatus::Completed | TransactionStatus::Failed) {
            return Err(StoreError::InvalidState {
                message: format!(
                    "transaction {} is {}, only Completed or Failed are persisted",
                    transaction.id, transaction.status
                ),
            });
        }

        let mut transactions = self.write_transactions()?;
        if let Some(existing) = transactions.get(&transaction.id) {
            if existing.transaction.status == TransactionStatus::Completed {
                return Err(StoreError::duplicate("transaction", transaction.id.clone()));
            }
        }

        transactions.insert(
            transaction.id.clone(),
            TransactionRecord {
                transaction: transaction.clone(),
                result: result.clone(),
                recorded_at: Utc::now(),
            },
        );

        debug!(tx_id = %transaction.id, status = %transaction.status, "Transaction recorded");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self.read_transactions()?.get(id).cloned())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records: Vec<_> = self
            .read_transactions()?
            .values()
            .filter(|r| r.transaction.requested_by == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.recorded_at);
        Ok(records)
    }
}

// =============================================================================
// Balance Repository Implementation
// =============================================================================

#[async_trait]
impl BalanceRepository for MemoryStore {
    async fn save_snapshot(&self, user_id: &str, balances: &BalanceSnapshot) -> Result<(), StoreError> {
        let mut stored = self
            .balances
            .write()
            .map_err(|e| StoreError::Database(format!("Failed to acquire write lock: {}", e)))?;

        for (symbol, value) in balances {
            stored.insert((user_id.to_string(), symbol.clone()), *value);
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<BalanceRecord>, StoreError> {
        let stored = self
            .balances
            .read()
            .map_err(|e| StoreError::Database(format!("Failed to acquire read lock: {}", e)))?;

        Ok(stored
            .iter()
            .map(|((user, symbol), value)| (user.clone(), symbol.clone(), *value))
            .collect())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn transactions(&self) -> &dyn TransactionRepository {
        self
    }

    fn balances(&self) -> &dyn BalanceRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
