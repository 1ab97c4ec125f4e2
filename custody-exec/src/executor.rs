//! Execution adapter: applies an approved transaction to the ledger.
//!
//! The adapter is the bridge between the confirmation flow and the ledger.
//! It resolves any missing destination amount from a quote source, hands the
//! instruction to the ledger and converts every outcome into a
//! [`TransactionResult`].
//!
//! # Flow
//!
//! ```text
//! Transaction → Replay check → Validate → Quote (swap only) → Ledger → Result
//! ```
//!
//! `prepare` runs the validate and quote steps alone, ahead of confirmation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use custody_domain::{Instruction, InstructionKind, Transaction, TransactionResult};
use custody_engine::convert;
use custody_ledger::{Ledger, LedgerError, LedgerReceipt};

use crate::error::{ExecError, ExecResult};
use crate::ports::QuotePort;

/// How long a quote source may take before the swap fails as unquotable.
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Execution Adapter
// =============================================================================

/// Executes approved transactions against the ledger.
///
/// Swaps without an explicit destination amount are priced through the quote
/// port and truncated to the destination token's precision. Stakes are 1:1
/// unless the instruction says otherwise and never fetch a quote.
pub struct ExecutionAdapter<Q: QuotePort> {
    /// Ledger holding all balances
    ledger: Arc<Ledger>,
    /// Price source for swap resolution
    quotes: Arc<Q>,
    /// Upper bound on a single quote request
    quote_timeout: Duration,
}

impl<Q: QuotePort> ExecutionAdapter<Q> {
    /// Create a new adapter.
    pub fn new(ledger: Arc<Ledger>, quotes: Arc<Q>) -> Self {
        Self {
            ledger,
            quotes,
            quote_timeout: DEFAULT_QUOTE_TIMEOUT,
        }
    }

    /// Bound each quote request by `quote_timeout`.
    pub fn with_quote_timeout(mut self, quote_timeout: Duration) -> Self {
        self.quote_timeout = quote_timeout;
        self
    }

    /// The ledger this adapter writes to.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Execute a transaction, expressing every failure as a failed result.
    pub async fn execute(&self, transaction: &Transaction) -> TransactionResult {
        match self.try_execute(transaction).await {
            Ok(receipt) => result_from_receipt(&receipt),
            Err(e) => {
                error!(tx_id = %transaction.id, error = %e, kind = %e.kind(), "Execution failed");
                TransactionResult::failed(&transaction.id, e.kind(), e.to_string())
            },
        }
    }

    /// Execute a transaction and return the ledger receipt.
    ///
    /// An already-applied id returns its recorded receipt without consulting
    /// the quote source, provided the user and instruction match.
    pub async fn try_execute(&self, transaction: &Transaction) -> ExecResult<LedgerReceipt> {
        if let Some(receipt) =
            self.ledger
                .replay(&transaction.id, &transaction.requested_by, &transaction.instruction)?
        {
            debug!(tx_id = %transaction.id, "Replaying applied transaction");
            return Ok(receipt);
        }

        let instruction = self.resolve(&transaction.requested_by, &transaction.instruction).await?;
        let receipt =
            self.ledger.execute(&transaction.id, &transaction.requested_by, &instruction)?;

        info!(
            tx_id = %receipt.tx_id,
            user = %receipt.user_id,
            replayed = receipt.replayed,
            "Transaction executed"
        );
        Ok(receipt)
    }

    /// Validate a transaction and fix its destination amount ahead of
    /// confirmation, so the approver sees exactly what will be credited.
    ///
    /// Nothing is applied. `try_execute` validates again regardless.
    pub async fn prepare(&self, transaction: &Transaction) -> ExecResult<Transaction> {
        let instruction = self.resolve(&transaction.requested_by, &transaction.instruction).await?;
        let mut prepared = transaction.clone();
        prepared.instruction = instruction;
        Ok(prepared)
    }

    /// Result previously produced for `transaction`, if its id was applied.
    ///
    /// Equal to the result returned by the original execution. An id applied
    /// for another user or instruction is an error, never that result.
    pub fn replay(&self, transaction: &Transaction) -> ExecResult<Option<TransactionResult>> {
        let receipt = self.ledger.replay(
            &transaction.id,
            &transaction.requested_by,
            &transaction.instruction,
        )?;
        Ok(receipt.map(|receipt| result_from_receipt(&receipt)))
    }

    /// Produce a ledger-executable instruction with the credit amount fixed.
    async fn resolve(&self, user_id: &str, instruction: &Instruction) -> ExecResult<Instruction> {
        // Unknown tokens and short balances fail before any quote is fetched
        self.ledger.validate(user_id, instruction)?;

        match instruction.kind {
            InstructionKind::Stake => Ok(instruction.clone()),
            InstructionKind::Swap if instruction.to_amount.is_some() => Ok(instruction.clone()),
            InstructionKind::Swap => self.quote_swap(instruction).await,
        }
    }

    async fn quote_swap(&self, instruction: &Instruction) -> ExecResult<Instruction> {
        let registry = self.ledger.registry();
        let from = registry
            .get(&instruction.from_token.symbol)
            .ok_or_else(|| LedgerError::UnknownToken(instruction.from_token.symbol.clone()))?;
        let to = registry
            .get(&instruction.to_token.symbol)
            .ok_or_else(|| LedgerError::UnknownToken(instruction.to_token.symbol.clone()))?;

        if from.address != instruction.from_token.address || to.address != instruction.to_token.address {
            warn!(
                from = %from.symbol,
                to = %to.symbol,
                "Instruction token address differs from registry, quoting registry address"
            );
        }

        let addresses = [from.address.clone(), to.address.clone()];
        let prices = tokio::time::timeout(self.quote_timeout, self.quotes.get_prices(&addresses))
            .await
            .map_err(|_| {
                ExecError::QuoteUnavailable(format!(
                    "no quote within {}s",
                    self.quote_timeout.as_secs()
                ))
            })?
            .map_err(|e| match e {
                ExecError::QuoteUnavailable(_) => e,
                other => ExecError::QuoteUnavailable(other.to_string()),
            })?;

        let from_price = prices
            .get(&from.address)
            .copied()
            .ok_or_else(|| ExecError::QuoteUnavailable(format!("no price for {}", from.symbol)))?;
        let to_price = prices
            .get(&to.address)
            .copied()
            .ok_or_else(|| ExecError::QuoteUnavailable(format!("no price for {}", to.symbol)))?;

        let to_amount = convert(instruction.from_amount, from_price, to_price, to.decimals)
            .map_err(|e| ExecError::QuoteUnavailable(e.to_string()))?;

        debug!(
            from = %from.symbol,
            to = %to.symbol,
            %from_price,
            %to_price,
            %to_amount,
            "Swap quoted"
        );

        Ok(instruction.clone().with_to_amount(to_amount))
    }
}

/// Build the caller-facing result for a receipt.
///
/// Deterministic in the receipt's content so a replay yields the same result.
fn result_from_receipt(receipt: &LedgerReceipt) -> TransactionResult {
    let verb = match receipt.kind {
        InstructionKind::Swap => "Swapped",
        InstructionKind::Stake => "Staked",
    };
    let message = format!(
        "{} {} {} for {} {}",
        verb, receipt.debited, receipt.from_symbol, receipt.credited, receipt.to_symbol
    );
    TransactionResult::completed(&receipt.tx_id, message, receipt.balances.clone())
}

// =============================================================================
// Tests
// =============================================================================
