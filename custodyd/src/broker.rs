//! Transaction request broker.
//!
//! Mediates between callers that want a transaction executed and the
//! confirming party that must approve it. One actor task owns all broker
//! state; callers and the confirming party talk to it through a cloneable
//! [`BrokerHandle`].
//!
//! # Flow
//!
//! ```text
//! request_transaction ─► queue (FIFO) ─► prepare ─► AwaitingConfirmation
//!                                                     │
//!                         confirm ─► Executing ─► Completed | Failed
//!                         reject / timeout ─► Rejected
//! ```
//!
//! At most one transaction is being prepared, awaiting confirmation or
//! executing at any time. Preparation (validation and quoting) runs in its
//! own task, so the actor keeps serving commands, deadlines and shutdown
//! while a quote is outstanding. Each caller holds a oneshot receiver that the
//! actor completes exactly once, whatever the outcome.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use custody_domain::{
    ErrorKind, Transaction, TransactionError, TransactionResult, TransactionStatus, TxId,
};
use custody_exec::{ExecResult, ExecutionAdapter, QuotePort};
use custody_store::Store;

use crate::event_bus::{BrokerEvent, EventBus};

/// Message carried by results of callers resolved during shutdown.
pub const SHUTDOWN_MESSAGE: &str = "broker shut down";

/// Message carried by results of a panicked execution.
pub const EXECUTION_FAILED_MESSAGE: &str = "execution failed";

// =============================================================================
// Confirmation View
// =============================================================================

/// What the confirming party sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationView {
    /// A transaction is awaiting a decision
    pub is_open: bool,
    /// The transaction awaiting a decision
    pub pending_transaction: Option<Transaction>,
    /// Error of the most recent failed transaction
    pub last_error: Option<TransactionError>,
    /// Requests waiting for the confirmation slot, including one being prepared
    pub queued: usize,
}

// =============================================================================
// Handle
// =============================================================================

enum BrokerCommand {
    Request {
        transaction: Transaction,
        reply: oneshot::Sender<TransactionResult>,
    },
    Decide {
        decision: Decision,
        expected: Option<TxId>,
        ack: oneshot::Sender<bool>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Confirm,
    Reject,
}

/// Cloneable handle to a running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    commands: mpsc::Sender<BrokerCommand>,
    view: watch::Receiver<ConfirmationView>,
}

impl BrokerHandle {
    /// Submit a transaction and wait for its result.
    ///
    /// Suspends until the confirming party decides, the confirmation times
    /// out or validation fails. Never panics and never hangs past broker
    /// shutdown.
    pub async fn request_transaction(&self, transaction: Transaction) -> TransactionResult {
        let tx_id = transaction.id.clone();
        let (reply, response) = oneshot::channel();

        if self.commands.send(BrokerCommand::Request { transaction, reply }).await.is_err() {
            warn!(%tx_id, "Broker is not running");
            return shutdown_result(&tx_id);
        }

        response.await.unwrap_or_else(|_| shutdown_result(&tx_id))
    }

    /// Approve whatever transaction is awaiting confirmation.
    ///
    /// Returns once execution finished. `false` if nothing was awaiting
    /// confirmation.
    pub async fn confirm(&self) -> bool {
        self.decide(Decision::Confirm, None).await
    }

    /// Approve `tx_id` only if it is the one awaiting confirmation.
    pub async fn confirm_tx(&self, tx_id: &str) -> bool {
        self.decide(Decision::Confirm, Some(tx_id.to_string())).await
    }

    /// Decline whatever transaction is awaiting confirmation.
    pub async fn reject(&self) -> bool {
        self.decide(Decision::Reject, None).await
    }

    /// Decline `tx_id` only if it is the one awaiting confirmation.
    pub async fn reject_tx(&self, tx_id: &str) -> bool {
        self.decide(Decision::Reject, Some(tx_id.to_string())).await
    }

    /// Current confirmation view.
    pub fn view(&self) -> ConfirmationView {
        self.view.borrow().clone()
    }

    /// Watch the confirmation view for changes.
    pub fn watch_view(&self) -> watch::Receiver<ConfirmationView> {
        self.view.clone()
    }

    async fn decide(&self, decision: Decision, expected: Option<TxId>) -> bool {
        let (ack, accepted) = oneshot::channel();
        if self.commands.send(BrokerCommand::Decide { decision, expected, ack }).await.is_err() {
            return false;
        }
        accepted.await.unwrap_or(false)
    }
}

fn shutdown_result(tx_id: &str) -> TransactionResult {
    TransactionResult::failed(tx_id, ErrorKind::InternalExecutionError, SHUTDOWN_MESSAGE)
}

// =============================================================================
// Broker Actor
// =============================================================================

struct PendingRequest {
    transaction: Transaction,
    reply: oneshot::Sender<TransactionResult>,
}

struct OpenConfirmation {
    request: PendingRequest,
    deadline: Instant,
}

/// Request whose amounts are being resolved before it is surfaced.
struct Preparing {
    request: PendingRequest,
    task: JoinHandle<ExecResult<Transaction>>,
}

type PrepareOutcome = Result<ExecResult<Transaction>, JoinError>;

enum Wake {
    Command(BrokerCommand),
    Prepared(PrepareOutcome),
    Expired,
    Shutdown,
}

/// Completes with the outcome of the running preparation; never completes if
/// none is running.
async fn prepared(preparing: &mut Option<Preparing>) -> PrepareOutcome {
    match preparing {
        Some(preparing) => (&mut preparing.task).await,
        None => std::future::pending().await,
    }
}

/// The actor owning all broker state.
pub struct TransactionBroker<Q: QuotePort + 'static, S: Store + 'static> {
    adapter: Arc<ExecutionAdapter<Q>>,
    store: Arc<S>,
    event_bus: Arc<EventBus>,
    confirmation_timeout: Duration,
    commands: mpsc::Receiver<BrokerCommand>,
    view: watch::Sender<ConfirmationView>,
    queue: VecDeque<PendingRequest>,
    preparing: Option<Preparing>,
    open: Option<OpenConfirmation>,
    last_error: Option<TransactionError>,
    cancel_token: CancellationToken,
}

impl<Q: QuotePort + 'static, S: Store + 'static> TransactionBroker<Q, S> {
    /// Spawn the broker actor.
    ///
    /// The actor stops when every handle is dropped or `cancel_token` is
    /// cancelled; callers still waiting are resolved with a shutdown failure.
    pub fn spawn(
        adapter: Arc<ExecutionAdapter<Q>>,
        store: Arc<S>,
        event_bus: Arc<EventBus>,
        confirmation_timeout: Duration,
        channel_capacity: usize,
        cancel_token: CancellationToken,
    ) -> (BrokerHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::channel(channel_capacity.max(1));
        let (view, view_rx) = watch::channel(ConfirmationView::default());

        let broker = Self {
            adapter,
            store,
            event_bus,
            confirmation_timeout,
            commands,
            view,
            queue: VecDeque::new(),
            preparing: None,
            open: None,
            last_error: None,
            cancel_token,
        };

        let handle = BrokerHandle {
            commands: command_tx,
            view: view_rx,
        };

        (handle, tokio::spawn(broker.run()))
    }

    async fn run(mut self) {
        info!(timeout_secs = self.confirmation_timeout.as_secs(), "Broker started");

        loop {
            let deadline = self.open.as_ref().map(|o| o.deadline);

            let wake = tokio::select! {
                _ = self.cancel_token.cancelled() => Wake::Shutdown,
                command = self.commands.recv() => match command {
                    Some(command) => Wake::Command(command),
                    None => Wake::Shutdown,
                },
                outcome = prepared(&mut self.preparing) => Wake::Prepared(outcome),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Wake::Expired
                },
            };

            match wake {
                Wake::Command(BrokerCommand::Request { transaction, reply }) => {
                    debug!(tx_id = %transaction.id, queued = self.queue.len(), "Request received");
                    self.queue.push_back(PendingRequest { transaction, reply });
                    self.advance();
                },
                Wake::Command(BrokerCommand::Decide { decision, expected, ack }) => {
                    let accepted = self.decide(decision, expected).await;
                    // Caller may have stopped waiting
                    let _ = ack.send(accepted);
                    self.advance();
                },
                Wake::Prepared(outcome) => {
                    self.surface(outcome).await;
                    self.advance();
                },
                Wake::Expired => {
                    self.expire();
                    self.advance();
                },
                Wake::Shutdown => break,
            }
        }

        self.shutdown();
    }

    /// Start preparing the next queued request if the slot is free.
    ///
    /// Replays are answered on the spot; anything else is handed to a
    /// preparation task whose outcome arrives as `Wake::Prepared`.
    fn advance(&mut self) {
        while self.open.is_none() && self.preparing.is_none() {
            let Some(request) = self.queue.pop_front() else {
                break;
            };

            if request.reply.is_closed() {
                info!(tx_id = %request.transaction.id, "Caller gone, dropping queued request");
                continue;
            }

            match self.adapter.replay(&request.transaction) {
                Ok(Some(result)) => {
                    info!(tx_id = %request.transaction.id, "Already applied, returning cached result");
                    self.resolve(request.reply, TransactionStatus::Completed, result);
                },
                Ok(None) => {
                    debug!(tx_id = %request.transaction.id, "Preparing");
                    let adapter = self.adapter.clone();
                    let candidate = request.transaction.clone();
                    let task = tokio::spawn(async move { adapter.prepare(&candidate).await });
                    self.preparing = Some(Preparing { request, task });
                },
                Err(e) => {
                    // The id belongs to another transaction, which keeps its record
                    warn!(tx_id = %request.transaction.id, error = %e, "Refused before confirmation");
                    let mut transaction = request.transaction;
                    self.finish(&mut transaction, TransactionStatus::Failed);
                    let result = TransactionResult::failed(&transaction.id, e.kind(), e.to_string());
                    self.resolve(request.reply, TransactionStatus::Failed, result);
                },
            }
        }

        self.publish_view();
    }

    /// Open a confirmation for a prepared request, or resolve it as failed.
    async fn surface(&mut self, outcome: PrepareOutcome) {
        let Some(Preparing { request, .. }) = self.preparing.take() else {
            return;
        };
        let PendingRequest { transaction, reply } = request;

        let failure = match outcome {
            Ok(Ok(mut prepared)) => {
                if reply.is_closed() {
                    info!(tx_id = %prepared.id, "Caller gone, dropping prepared request");
                    return;
                }

                // Surfaced transactions always start Pending
                prepared.status = TransactionStatus::Pending;
                info!(
                    tx_id = %prepared.id,
                    user = %prepared.requested_by,
                    kind = %prepared.instruction.kind,
                    queued = self.queue.len(),
                    "Awaiting confirmation"
                );
                self.event_bus.send(BrokerEvent::ConfirmationRequested {
                    transaction: prepared.clone(),
                    queued: self.queue.len(),
                });
                self.open = Some(OpenConfirmation {
                    request: PendingRequest {
                        transaction: prepared,
                        reply,
                    },
                    deadline: Instant::now() + self.confirmation_timeout,
                });
                return;
            },
            Ok(Err(e)) => {
                warn!(tx_id = %transaction.id, error = %e, "Rejected before confirmation");
                TransactionResult::failed(&transaction.id, e.kind(), e.to_string())
            },
            Err(e) => {
                error!(tx_id = %transaction.id, error = %e, "Preparation task failed");
                TransactionResult::failed(
                    &transaction.id,
                    ErrorKind::InternalExecutionError,
                    EXECUTION_FAILED_MESSAGE,
                )
            },
        };

        let mut transaction = transaction;
        self.finish(&mut transaction, TransactionStatus::Failed);
        self.persist(&transaction, &failure).await;
        self.resolve(reply, TransactionStatus::Failed, failure);
    }

    async fn decide(&mut self, decision: Decision, expected: Option<TxId>) -> bool {
        let matches = match (&self.open, &expected) {
            (None, _) => false,
            (Some(open), Some(tx_id)) => open.request.transaction.id == *tx_id,
            (Some(_), None) => true,
        };
        if !matches {
            debug!(?decision, ?expected, "Decision ignored, no matching confirmation open");
            return false;
        }

        let Some(open) = self.open.take() else {
            return false;
        };
        let PendingRequest { mut transaction, reply } = open.request;

        match decision {
            Decision::Confirm => {
                self.finish(&mut transaction, TransactionStatus::Confirmed);
                self.close(&transaction);
                self.execute(transaction, reply).await;
            },
            Decision::Reject => {
                info!(tx_id = %transaction.id, "Rejected by confirming party");
                self.finish(&mut transaction, TransactionStatus::Rejected);
                self.close(&transaction);
                let result = TransactionResult::rejected(&transaction.id);
                self.resolve(reply, TransactionStatus::Rejected, result);
            },
        }
        true
    }

    async fn execute(&mut self, mut transaction: Transaction, reply: oneshot::Sender<TransactionResult>) {
        self.finish(&mut transaction, TransactionStatus::Executing);
        info!(tx_id = %transaction.id, "Executing");

        let adapter = self.adapter.clone();
        let job = transaction.clone();
        let result = match tokio::spawn(async move { adapter.execute(&job).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(tx_id = %transaction.id, error = %e, "Execution task failed");
                TransactionResult::failed(
                    &transaction.id,
                    ErrorKind::InternalExecutionError,
                    EXECUTION_FAILED_MESSAGE,
                )
            },
        };

        let status = if result.success {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        self.finish(&mut transaction, status);
        self.persist(&transaction, &result).await;
        self.resolve(reply, status, result);
    }

    fn expire(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };
        let PendingRequest { mut transaction, reply } = open.request;

        warn!(
            tx_id = %transaction.id,
            timeout_secs = self.confirmation_timeout.as_secs(),
            "Confirmation timed out, auto-rejecting"
        );
        self.finish(&mut transaction, TransactionStatus::Rejected);
        self.close(&transaction);

        let result = TransactionResult::failed(
            &transaction.id,
            ErrorKind::ConfirmationTimeout,
            format!("confirmation timed out after {}s", self.confirmation_timeout.as_secs()),
        );
        self.resolve(reply, TransactionStatus::Rejected, result);
    }

    fn shutdown(&mut self) {
        let outstanding = self.open.take().map(|o| o.request).into_iter();
        let preparing = self.preparing.take().map(|p| {
            p.task.abort();
            p.request
        });
        let queued = std::mem::take(&mut self.queue);
        let mut count = 0;

        for request in outstanding.chain(preparing).chain(queued) {
            count += 1;
            let result = shutdown_result(&request.transaction.id);
            self.resolve(request.reply, TransactionStatus::Failed, result);
        }

        self.publish_view();
        info!(resolved = count, "Broker stopped");
    }

    /// Move `transaction` to `next`, logging an illegal transition instead
    /// of failing the caller.
    fn finish(&self, transaction: &mut Transaction, next: TransactionStatus) {
        if let Err(e) = transaction.transition(next) {
            error!(tx_id = %transaction.id, error = %e, "Illegal status transition");
            transaction.status = next;
        }
    }

    fn close(&self, transaction: &Transaction) {
        self.event_bus.send(BrokerEvent::ConfirmationClosed {
            tx_id: transaction.id.clone(),
            status: transaction.status,
            timestamp: Utc::now(),
        });
        self.publish_view();
    }

    /// Hand a resolved transaction to durable storage. Failures are logged
    /// and never change the caller's result.
    async fn persist(&self, transaction: &Transaction, result: &TransactionResult) {
        if let Err(e) = self.store.transactions().record(transaction, result).await {
            error!(tx_id = %transaction.id, error = %e, "Failed to persist transaction");
        }

        if let Some(effects) = &result.effects {
            if let Err(e) = self
                .store
                .balances()
                .save_snapshot(&transaction.requested_by, &effects.token_balances)
                .await
            {
                error!(tx_id = %transaction.id, error = %e, "Failed to persist balances");
            }
        }
    }

    fn resolve(
        &mut self,
        reply: oneshot::Sender<TransactionResult>,
        status: TransactionStatus,
        result: TransactionResult,
    ) {
        if result.success {
            self.last_error = None;
        } else if status == TransactionStatus::Failed {
            self.last_error = result.error.clone();
        }

        info!(
            tx_id = %result.tx_id,
            %status,
            success = result.success,
            error_kind = ?result.error_kind(),
            "Transaction resolved"
        );
        self.event_bus.send(BrokerEvent::TransactionResolved {
            result: result.clone(),
            status,
        });
        // Observers see the new view no later than the caller sees its result
        self.publish_view();

        if reply.send(result).is_err() {
            debug!("Caller dropped before the result was delivered");
        }
    }

    fn publish_view(&self) {
        let (is_open, pending_transaction) = match &self.open {
            Some(open) => (true, Some(open.request.transaction.clone())),
            None => (false, None),
        };

        self.view.send_replace(ConfirmationView {
            is_open,
            pending_transaction,
            last_error: self.last_error.clone(),
            queued: self.queue.len() + usize::from(self.preparing.is_some()),
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
