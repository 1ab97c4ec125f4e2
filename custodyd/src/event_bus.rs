//! Event bus for confirmation notifications.
//!
//! The broker publishes every confirmation transition here so a confirming
//! party (a UI bridge, the auto-confirm agent, logs) can react without the
//! broker ever waiting on it.
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers.

use chrono::{DateTime, Utc};
use custody_domain::{Transaction, TransactionResult, TransactionStatus, TxId};
use tokio::sync::broadcast;

// =============================================================================
// Event Types
// =============================================================================

/// Events that flow through the daemon event bus.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A transaction is awaiting the confirming party
    ConfirmationRequested {
        transaction: Transaction,
        /// Requests waiting behind this one
        queued: usize,
    },

    /// The open confirmation was decided or expired
    ConfirmationClosed {
        tx_id: TxId,
        status: TransactionStatus,
        timestamp: DateTime<Utc>,
    },

    /// A caller was resumed with its result
    TransactionResolved {
        result: TransactionResult,
        status: TransactionStatus,
    },
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for daemon-wide communication.
///
/// Multiple producers can send events, and multiple consumers can receive.
/// Uses broadcast channels for fan-out pattern.
pub struct EventBus {
    sender: broadcast::Sender<BrokerEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active receivers.
    pub fn send(&self, event: BrokerEvent) -> usize {
        // send() returns Err if there are no receivers, but we don't care
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will receive all events sent after subscription.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiver for broker events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<BrokerEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<BrokerEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<BrokerEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(tx_id: &str) -> BrokerEvent {
        BrokerEvent::ConfirmationClosed {
            tx_id: tx_id.to_string(),
            status: TransactionStatus::Rejected,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_fan_out() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.send(closed("tx-1")), 2);

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await {
                Some(Ok(BrokerEvent::ConfirmationClosed { tx_id, .. })) => assert_eq!(tx_id, "tx-1"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_send_without_receivers_does_not_block() {
        let bus = EventBus::new(4);
        assert_eq!(bus.send(closed("tx-1")), 0);
    }

    #[test]
    fn test_lagged_receiver_reports_missed_events() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();

        for i in 0..5 {
            bus.send(closed(&format!("tx-{}", i)));
        }

        assert!(matches!(receiver.try_recv(), Some(Err(_))));
        assert!(matches!(receiver.try_recv(), Some(Ok(_))));
    }
}
