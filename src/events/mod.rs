use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Events emitted by the checkout lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutStarted {
        session_id: Uuid,
        cart_id: Uuid,
    },
    AddressCaptured {
        session_id: Uuid,
    },
    CouponApplied {
        session_id: Uuid,
        code: String,
    },
    CouponRemoved {
        session_id: Uuid,
    },
    EvidenceUploaded {
        session_id: Uuid,
        url: String,
    },
    CheckoutSubmitted {
        session_id: Uuid,
    },
    OrderCreated(Uuid),
    CheckoutFailed {
        session_id: Uuid,
        reason: String,
    },
    CheckoutAbandoned {
        session_id: Uuid,
    },
    CartCleared {
        cart_id: Uuid,
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

    /// Sends an event, failing if the channel is closed or full.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of propagating failure. Event loss is
    /// tolerable everywhere the checkout flow publishes.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("Dropping event: {}", e);
        }
    }
}

/// Consumes lifecycle events. Order creation is the hook where a fulfilment
/// or notification system would subscribe; here every event is logged.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "Order created");
            }
            Event::CheckoutFailed { session_id, reason } => {
                info!(%session_id, reason, "Checkout attempt failed");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
