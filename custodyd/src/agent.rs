//! Automated confirming party.
//!
//! Listens for confirmation requests on the event bus and approves each one
//! through the broker handle. Used for unattended development setups and
//! tests; a human-facing surface talks to the same handle instead.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::BrokerHandle;
use crate::event_bus::{BrokerEvent, EventBus};

/// Confirms every surfaced transaction.
pub struct AutoConfirmAgent {
    broker: BrokerHandle,
    event_bus: Arc<EventBus>,
    cancel_token: CancellationToken,
}

impl AutoConfirmAgent {
    /// Create a new agent.
    pub fn new(broker: BrokerHandle, event_bus: Arc<EventBus>, cancel_token: CancellationToken) -> Self {
        Self {
            broker,
            event_bus,
            cancel_token,
        }
    }

    /// Spawn the agent as an async task.
    ///
    /// Resolves to the number of transactions it confirmed. The subscription
    /// is taken before spawning so no request published afterwards is missed.
    pub fn spawn(self) -> JoinHandle<usize> {
        let receiver = self.event_bus.subscribe();
        tokio::spawn(async move {
            info!("Auto-confirm agent started");
            let confirmed = self.run(receiver).await;
            info!(confirmed, "Auto-confirm agent stopped");
            confirmed
        })
    }

    async fn run(self, mut receiver: crate::event_bus::EventReceiver) -> usize {
        let mut confirmed = 0;

        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(Ok(BrokerEvent::ConfirmationRequested { transaction, .. })) => {
                        if self.broker.confirm_tx(&transaction.id).await {
                            confirmed += 1;
                            debug!(tx_id = %transaction.id, "Auto-confirmed");
                        } else {
                            debug!(tx_id = %transaction.id, "Confirmation no longer open");
                        }
                    },
                    Some(Ok(_)) => {},
                    Some(Err(lag_msg)) => {
                        // A missed request would otherwise wait for its timeout
                        warn!(%lag_msg, "Agent receiver lagged, confirming current request");
                        if self.broker.confirm().await {
                            confirmed += 1;
                        }
                    },
                    None => break,
                },
                _ = self.cancel_token.cancelled() => break,
            }
        }

        confirmed
    }
}
