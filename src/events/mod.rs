use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events emitted by the order pipeline. Consumers are best-effort:
/// a full channel never fails the request that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: i64,
    },
    CheckoutSessionCreated {
        /// None for standalone single-product sessions, which have no order.
        order_id: Option<Uuid>,
        session_id: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderPaid {
        order_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Builds a sender/receiver pair with a bounded queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event, logging instead of failing when the consumer lags.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("failed to enqueue domain event: {}", e);
        }
    }
}

/// Drains the event queue, logging each event. Runs for the lifetime of the
/// process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                total_amount,
            } => {
                info!(%order_id, %user_id, total_amount, "order created");
            }
            Event::CheckoutSessionCreated {
                order_id,
                session_id,
            } => {
                info!(?order_id, %session_id, "checkout session created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrderPaid { order_id } => {
                info!(%order_id, "order paid");
            }
        }
    }
}
