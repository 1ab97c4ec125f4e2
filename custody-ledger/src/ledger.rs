//! Ledger engine.
//!
//! Owns every balance. All mutation goes through [`Ledger::execute`],
//! [`Ledger::deposit`] or [`Ledger::seed`], each of which holds the single
//! write lock for its whole check-and-apply step.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

use custody_domain::{
    Amount, BalanceSnapshot, DomainError, Instruction, InstructionKind, TokenRef, TxId, UserId,
};

use crate::error::{LedgerError, LedgerResult};
use crate::fingerprint::instruction_fingerprint;
use crate::registry::TokenRegistry;

// =============================================================================
// Receipt
// =============================================================================

/// Record of an applied instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub tx_id: TxId,
    pub user_id: UserId,
    pub kind: InstructionKind,
    pub from_symbol: String,
    pub debited: Amount,
    pub to_symbol: String,
    pub credited: Amount,
    /// Post-state balances of the two affected symbols
    pub balances: BalanceSnapshot,
    pub applied_at: DateTime<Utc>,
    /// True when this receipt was returned for an already-applied id
    pub replayed: bool,
}

struct AppliedTransaction {
    receipt: LedgerReceipt,
    fingerprint: String,
}

impl AppliedTransaction {
    /// The recorded receipt, if `instruction` for `user_id` is the same
    /// transaction. An unresolved swap matches on everything but its credit.
    fn replay(&self, tx_id: &str, user_id: &str, instruction: &Instruction) -> LedgerResult<LedgerReceipt> {
        let fingerprint = match instruction.credit_amount() {
            Some(_) => instruction_fingerprint(user_id, instruction),
            None => instruction_fingerprint(
                user_id,
                &instruction.clone().with_to_amount(self.receipt.credited),
            ),
        };

        if fingerprint != self.fingerprint {
            warn!(
                %tx_id,
                user = %user_id,
                recorded_user = %self.receipt.user_id,
                "Transaction id reused with different content"
            );
            return Err(LedgerError::ReplayConflict(tx_id.to_string()));
        }

        let mut receipt = self.receipt.clone();
        receipt.replayed = true;
        Ok(receipt)
    }
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<UserId, HashMap<String, Decimal>>,
    applied: HashMap<TxId, AppliedTransaction>,
}

impl LedgerState {
    fn balance(&self, user_id: &str, symbol: &str) -> Decimal {
        self.balances
            .get(user_id)
            .and_then(|b| b.get(symbol))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// In-memory balance ledger.
///
/// Writers are serialized by one `RwLock`; readers share it and only ever
/// see fully applied transactions.
pub struct Ledger {
    registry: TokenRegistry,
    state: RwLock<LedgerState>,
}

impl Ledger {
    /// Create an empty ledger over `registry`.
    pub fn new(registry: TokenRegistry) -> Self {
        Self {
            registry,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// The token registry
    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Check that `user_id` can fund `instruction`. Read-only.
    ///
    /// # Errors
    /// - `LedgerError::UnknownToken` if either token is unregistered
    /// - `LedgerError::InsufficientBalance` if the source balance is short
    /// - `LedgerError::InvalidInstruction` if the instruction is malformed
    pub fn validate(&self, user_id: &str, instruction: &Instruction) -> LedgerResult<()> {
        let state = self.read()?;
        self.check_funds(&state, user_id, instruction)
    }

    /// Validate and apply `instruction` for `user_id` under `tx_id`.
    ///
    /// If `tx_id` was applied before with the same user and instruction, the
    /// recorded receipt is returned with `replayed = true` and no balance
    /// changes. Failed validation does not consume the id.
    ///
    /// # Errors
    /// `LedgerError::ReplayConflict` if `tx_id` was applied with different
    /// content, plus every error of [`Ledger::validate`].
    pub fn execute(
        &self,
        tx_id: &str,
        user_id: &str,
        instruction: &Instruction,
    ) -> LedgerResult<LedgerReceipt> {
        let fingerprint = instruction_fingerprint(user_id, instruction);
        let mut state = self.write()?;

        // 1. Idempotent replay
        if let Some(applied) = state.applied.get(tx_id) {
            let receipt = applied.replay(tx_id, user_id, instruction)?;
            info!(%tx_id, "Transaction already applied, replaying receipt");
            return Ok(receipt);
        }

        // 2. Validate against current state
        self.check_funds(&state, user_id, instruction)?;
        let debit = instruction.from_amount;
        let credit = instruction
            .credit_amount()
            .ok_or_else(|| LedgerError::UnresolvedAmount(tx_id.to_string()))?;

        let from_symbol = instruction.from_token.symbol.clone();
        let to_symbol = instruction.to_token.symbol.clone();

        // 3. Compute both post-state balances before touching the map
        let new_from = state.balance(user_id, &from_symbol) - debit.as_decimal();
        let new_to = state
            .balance(user_id, &to_symbol)
            .checked_add(credit.as_decimal())
            .ok_or_else(|| LedgerError::Overflow {
                user: user_id.to_string(),
                symbol: to_symbol.clone(),
            })?;

        // 4. Apply
        let user_balances = state.balances.entry(user_id.to_string()).or_default();
        user_balances.insert(from_symbol.clone(), new_from);
        user_balances.insert(to_symbol.clone(), new_to);

        let balances: BalanceSnapshot = [
            (from_symbol.clone(), new_from.normalize()),
            (to_symbol.clone(), new_to.normalize()),
        ]
        .into_iter()
        .collect();

        let receipt = LedgerReceipt {
            tx_id: tx_id.to_string(),
            user_id: user_id.to_string(),
            kind: instruction.kind,
            from_symbol,
            debited: debit,
            to_symbol,
            credited: credit,
            balances,
            applied_at: Utc::now(),
            replayed: false,
        };

        state.applied.insert(
            tx_id.to_string(),
            AppliedTransaction {
                receipt: receipt.clone(),
                fingerprint,
            },
        );

        info!(
            %tx_id,
            user = %user_id,
            kind = %receipt.kind,
            debited = %format!("{} {}", receipt.debited, receipt.from_symbol),
            credited = %format!("{} {}", receipt.credited, receipt.to_symbol),
            "Transaction applied"
        );

        Ok(receipt)
    }

    /// Snapshot of every balance held by `user_id`.
    pub fn balances_of(&self, user_id: &str) -> LedgerResult<BalanceSnapshot> {
        let state = self.read()?;
        Ok(state
            .balances
            .get(user_id)
            .map(|b| b.iter().map(|(s, v)| (s.clone(), v.normalize())).collect())
            .unwrap_or_default())
    }

    /// Balance of one token (zero if never held).
    pub fn balance(&self, user_id: &str, symbol: &str) -> LedgerResult<Decimal> {
        if !self.registry.contains(symbol) {
            return Err(LedgerError::UnknownToken(symbol.to_string()));
        }
        Ok(self.read()?.balance(user_id, symbol).normalize())
    }

    /// Whether `tx_id` has been applied.
    pub fn is_applied(&self, tx_id: &str) -> LedgerResult<bool> {
        Ok(self.read()?.applied.contains_key(tx_id))
    }

    /// Recorded receipt for an applied `tx_id`, marked as a replay.
    ///
    /// `None` if the id was never applied. Fails with
    /// `LedgerError::ReplayConflict` if it was applied for another user or
    /// instruction.
    pub fn replay(
        &self,
        tx_id: &str,
        user_id: &str,
        instruction: &Instruction,
    ) -> LedgerResult<Option<LedgerReceipt>> {
        self.read()?
            .applied
            .get(tx_id)
            .map(|a| a.replay(tx_id, user_id, instruction))
            .transpose()
    }

    /// Number of applied transactions.
    pub fn applied_count(&self) -> LedgerResult<usize> {
        Ok(self.read()?.applied.len())
    }

    /// Credit `amount` of `symbol` to `user_id` outside of any transaction.
    ///
    /// Returns the new balance.
    pub fn deposit(&self, user_id: &str, symbol: &str, amount: Decimal) -> LedgerResult<Decimal> {
        if !self.registry.contains(symbol) {
            return Err(LedgerError::UnknownToken(symbol.to_string()));
        }
        if amount < Decimal::ZERO {
            return Err(LedgerError::NegativeBalance {
                user: user_id.to_string(),
                symbol: symbol.to_string(),
                value: amount,
            });
        }

        let mut state = self.write()?;
        let current = state.balance(user_id, symbol);
        let updated = current.checked_add(amount).ok_or_else(|| LedgerError::Overflow {
            user: user_id.to_string(),
            symbol: symbol.to_string(),
        })?;
        state
            .balances
            .entry(user_id.to_string())
            .or_default()
            .insert(symbol.to_string(), updated);

        debug!(user = %user_id, %symbol, %amount, balance = %updated, "Deposit");
        Ok(updated)
    }

    /// Replace balances with `records` (user, symbol, balance), e.g. when
    /// re-seeding from durable storage after a restart.
    ///
    /// All records are checked before any is written.
    pub fn seed(
        &self,
        records: impl IntoIterator<Item = (UserId, String, Decimal)>,
    ) -> LedgerResult<usize> {
        let records: Vec<_> = records.into_iter().collect();
        for (user, symbol, value) in &records {
            if !self.registry.contains(symbol) {
                return Err(LedgerError::UnknownToken(symbol.clone()));
            }
            if *value < Decimal::ZERO {
                return Err(LedgerError::NegativeBalance {
                    user: user.clone(),
                    symbol: symbol.clone(),
                    value: *value,
                });
            }
        }

        let mut state = self.write()?;
        let count = records.len();
        for (user, symbol, value) in records {
            state.balances.entry(user).or_default().insert(symbol, value);
        }

        info!(count, "Ledger seeded");
        Ok(count)
    }

    fn check_funds(
        &self,
        state: &LedgerState,
        user_id: &str,
        instruction: &Instruction,
    ) -> LedgerResult<()> {
        instruction.validate()?;

        let from = self.registered(&instruction.from_token.symbol)?;
        let to = self.registered(&instruction.to_token.symbol)?;

        check_precision(instruction.from_amount, from)?;
        if let Some(credit) = instruction.credit_amount() {
            check_precision(credit, to)?;
        }

        let available = state.balance(user_id, &instruction.from_token.symbol);
        let required = instruction.from_amount.as_decimal();
        if available < required {
            return Err(LedgerError::InsufficientBalance {
                user: user_id.to_string(),
                symbol: instruction.from_token.symbol.clone(),
                required,
                available,
            });
        }

        Ok(())
    }

    fn registered(&self, symbol: &str) -> LedgerResult<&TokenRef> {
        self.registry
            .get(symbol)
            .ok_or_else(|| LedgerError::UnknownToken(symbol.to_string()))
    }

    fn read(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|e| LedgerError::Poisoned(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> LedgerResult<std::sync::RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|e| LedgerError::Poisoned(format!("Failed to acquire write lock: {}", e)))
    }
}

/// Amounts may not carry more decimals than the registered token holds.
fn check_precision(amount: Amount, token: &TokenRef) -> LedgerResult<()> {
    if amount.fits_decimals(token.decimals) {
        return Ok(());
    }
    Err(LedgerError::InvalidInstruction(DomainError::InvalidAmount(format!(
        "{} {} exceeds the token's {} decimals",
        amount, token.symbol, token.decimals
    ))))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use custody_domain::TokenRef;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn sol() -> TokenRef {
        TokenRef::new("SOL", "So11111111111111111111111111111111111111112", 9).unwrap()
    }

    fn usdc() -> TokenRef {
        TokenRef::new("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6).unwrap()
    }

    fn msol() -> TokenRef {
        TokenRef::new("MSOL", "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", 9).unwrap()
    }

    fn create_test_ledger() -> Ledger {
        Ledger::new(TokenRegistry::with_tokens([sol(), usdc(), msol()]).unwrap())
    }

    fn swap(from_amount: Decimal, to_amount: Decimal) -> Instruction {
        Instruction::new(
            InstructionKind::Swap,
            sol(),
            usdc(),
            Amount::new(from_amount).unwrap(),
            Some(Amount::new(to_amount).unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn test_swap_conserves_declared_amounts() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();
        ledger.deposit("alice", "USDC", dec!(25)).unwrap();

        let receipt = ledger.execute("tx-1", "alice", &swap(dec!(10), dec!(1500))).unwrap();

        assert!(!receipt.replayed);
        assert_eq!(receipt.debited.as_decimal(), dec!(10));
        assert_eq!(receipt.credited.as_decimal(), dec!(1500));
        assert_eq!(receipt.balances["SOL"], dec!(0));
        assert_eq!(receipt.balances["USDC"], dec!(1525));
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(0));
        assert_eq!(ledger.balance("alice", "USDC").unwrap(), dec!(1525));
    }

    #[test]
    fn test_insufficient_balance_leaves_state_untouched() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(1)).unwrap();

        let err = ledger.execute("tx-1", "alice", &swap(dec!(5), dec!(750))).unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                user: "alice".to_string(),
                symbol: "SOL".to_string(),
                required: dec!(5),
                available: dec!(1),
            }
        );
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(1));
        assert_eq!(ledger.balance("alice", "USDC").unwrap(), dec!(0));
        assert!(!ledger.is_applied("tx-1").unwrap());
    }

    #[test]
    fn test_failed_validation_does_not_consume_id() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(1)).unwrap();

        assert!(ledger.execute("tx-1", "alice", &swap(dec!(5), dec!(750))).is_err());

        ledger.deposit("alice", "SOL", dec!(4)).unwrap();
        let receipt = ledger.execute("tx-1", "alice", &swap(dec!(5), dec!(750))).unwrap();
        assert!(!receipt.replayed);
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(0));
    }

    #[test]
    fn test_idempotent_replay() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        let first = ledger.execute("tx-1", "alice", &swap(dec!(4), dec!(600))).unwrap();
        let second = ledger.execute("tx-1", "alice", &swap(dec!(4), dec!(600))).unwrap();

        assert!(second.replayed);
        assert_eq!(first.balances, second.balances);
        assert_eq!(first.applied_at, second.applied_at);
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(6));
        assert_eq!(ledger.balance("alice", "USDC").unwrap(), dec!(600));
        assert_eq!(ledger.applied_count().unwrap(), 1);
    }

    #[test]
    fn test_replay_with_different_content_is_refused() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        ledger.execute("tx-1", "alice", &swap(dec!(4), dec!(600))).unwrap();
        let err = ledger.execute("tx-1", "alice", &swap(dec!(9), dec!(1350))).unwrap_err();

        assert_eq!(err, LedgerError::ReplayConflict("tx-1".to_string()));
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(6));
        assert_eq!(ledger.balance("alice", "USDC").unwrap(), dec!(600));
    }

    #[test]
    fn test_reused_id_from_other_user_leaks_nothing() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();
        ledger.execute("tx-1", "alice", &swap(dec!(1), dec!(150))).unwrap();

        let err = ledger.execute("tx-1", "bob", &swap(dec!(1), dec!(150))).unwrap_err();

        assert_eq!(err, LedgerError::ReplayConflict("tx-1".to_string()));
        assert_eq!(
            ledger.replay("tx-1", "bob", &swap(dec!(1), dec!(150))),
            Err(LedgerError::ReplayConflict("tx-1".to_string()))
        );
        assert!(ledger.balances_of("bob").unwrap().is_empty());
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(9));
    }

    #[test]
    fn test_replay_of_unresolved_swap_matches_recorded_credit() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();
        ledger.execute("tx-1", "alice", &swap(dec!(2), dec!(300))).unwrap();

        let unresolved = Instruction::new(
            InstructionKind::Swap,
            sol(),
            usdc(),
            Amount::new(dec!(2)).unwrap(),
            None,
        )
        .unwrap();

        let receipt = ledger.replay("tx-1", "alice", &unresolved).unwrap().unwrap();
        assert!(receipt.replayed);
        assert_eq!(receipt.credited.as_decimal(), dec!(300));
        assert_eq!(ledger.replay("tx-2", "alice", &unresolved), Ok(None));
    }

    #[test]
    fn test_amounts_beyond_registry_precision_are_rejected() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        // USDC holds 6 decimals
        let err = ledger
            .execute("tx-1", "alice", &swap(dec!(10), dec!(1500.123456789)))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidInstruction(DomainError::InvalidAmount(_))
        ));

        // SOL holds 9 decimals
        let err = ledger
            .validate("alice", &swap(dec!(0.0000000001), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInstruction(_)));

        assert!(!ledger.is_applied("tx-1").unwrap());
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(10));
        assert_eq!(ledger.balance("alice", "USDC").unwrap(), dec!(0));
    }

    #[test]
    fn test_replay_ignores_current_balance() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();
        ledger.execute("tx-1", "alice", &swap(dec!(10), dec!(1500))).unwrap();

        // Balance is now zero; a fresh validation would fail, the replay must not
        let replay = ledger.execute("tx-1", "alice", &swap(dec!(10), dec!(1500))).unwrap();
        assert!(replay.replayed);
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        let bonk = TokenRef::new("BONK", "bonk-mint", 5).unwrap();
        let instruction = Instruction::new(
            InstructionKind::Swap,
            sol(),
            bonk,
            Amount::new(dec!(1)).unwrap(),
            Some(Amount::new(dec!(1000)).unwrap()),
        )
        .unwrap();

        let err = ledger.execute("tx-1", "alice", &instruction).unwrap_err();
        assert_eq!(err, LedgerError::UnknownToken("BONK".to_string()));
        assert!(!ledger.balances_of("alice").unwrap().contains_key("BONK"));
    }

    #[test]
    fn test_unknown_token_checked_before_balance() {
        let ledger = create_test_ledger();
        let bonk = TokenRef::new("BONK", "bonk-mint", 5).unwrap();
        let instruction = Instruction::new(
            InstructionKind::Swap,
            bonk,
            usdc(),
            Amount::new(dec!(1)).unwrap(),
            Some(Amount::new(dec!(1)).unwrap()),
        )
        .unwrap();

        assert_eq!(
            ledger.validate("alice", &instruction),
            Err(LedgerError::UnknownToken("BONK".to_string()))
        );
    }

    #[test]
    fn test_stake_credits_one_to_one() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(3)).unwrap();

        let stake = Instruction::new(
            InstructionKind::Stake,
            sol(),
            msol(),
            Amount::new(dec!(2.5)).unwrap(),
            None,
        )
        .unwrap();

        let receipt = ledger.execute("stake-1", "alice", &stake).unwrap();
        assert_eq!(receipt.balances["SOL"], dec!(0.5));
        assert_eq!(receipt.balances["MSOL"], dec!(2.5));
    }

    #[test]
    fn test_unresolved_swap_is_rejected() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(3)).unwrap();

        let unresolved = Instruction::new(
            InstructionKind::Swap,
            sol(),
            usdc(),
            Amount::new(dec!(1)).unwrap(),
            None,
        )
        .unwrap();

        // Funds check passes, execution needs a resolved amount
        assert!(ledger.validate("alice", &unresolved).is_ok());
        assert_eq!(
            ledger.execute("tx-1", "alice", &unresolved),
            Err(LedgerError::UnresolvedAmount("tx-1".to_string()))
        );
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(3));
    }

    #[test]
    fn test_balances_are_per_user() {
        let ledger = create_test_ledger();
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        let err = ledger.execute("tx-1", "bob", &swap(dec!(1), dec!(150))).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert!(ledger.balances_of("bob").unwrap().is_empty());
    }

    #[test]
    fn test_seed_validates_before_writing() {
        let ledger = create_test_ledger();

        let err = ledger
            .seed([
                ("alice".to_string(), "SOL".to_string(), dec!(5)),
                ("alice".to_string(), "USDC".to_string(), dec!(-1)),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::NegativeBalance { .. }));
        assert!(ledger.balances_of("alice").unwrap().is_empty());

        ledger
            .seed([
                ("alice".to_string(), "SOL".to_string(), dec!(5)),
                ("alice".to_string(), "USDC".to_string(), dec!(20)),
            ])
            .unwrap();
        let balances = ledger.balances_of("alice").unwrap();
        assert_eq!(balances["SOL"], dec!(5));
        assert_eq!(balances["USDC"], dec!(20));
    }

    #[test]
    fn test_deposit_rejects_unknown_and_negative() {
        let ledger = create_test_ledger();
        assert_eq!(
            ledger.deposit("alice", "BONK", dec!(1)),
            Err(LedgerError::UnknownToken("BONK".to_string()))
        );
        assert!(matches!(
            ledger.deposit("alice", "SOL", dec!(-1)),
            Err(LedgerError::NegativeBalance { .. })
        ));
    }

    #[test]
    fn test_concurrent_execute_never_overdraws() {
        let ledger = Arc::new(create_test_ledger());
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        // 40 swaps of 1 SOL against a 10 SOL balance
        let handles: Vec<_> = (0..40)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    ledger.execute(&format!("tx-{}", i), "alice", &swap(dec!(1), dec!(150)))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let applied = results.iter().filter(|r| r.is_ok()).count();

        assert_eq!(applied, 10);
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(0));
        assert_eq!(ledger.balance("alice", "USDC").unwrap(), dec!(1500));
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, LedgerError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_concurrent_duplicate_ids_apply_once() {
        let ledger = Arc::new(create_test_ledger());
        ledger.deposit("alice", "SOL", dec!(10)).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.execute("tx-dup", "alice", &swap(dec!(2), dec!(300))))
            })
            .collect();

        let receipts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

        assert_eq!(receipts.iter().filter(|r| !r.replayed).count(), 1);
        assert_eq!(ledger.balance("alice", "SOL").unwrap(), dec!(8));
        assert_eq!(ledger.balance("alice", "USDC").unwrap(), dec!(300));
    }
}
