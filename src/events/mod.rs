use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the ordering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    PaymentIntentCreated {
        order_id: Uuid,
        payment_intent_id: String,
    },
    PaymentSetupFailed {
        order_id: Uuid,
        reason: String,
    },
    WalletCreditApplied {
        order_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
    },
    /// A caller claimed more wallet credit than their balance holds. The
    /// claim was clamped, but the attempt is surfaced as an abuse signal.
    WalletOverclaimAttempted {
        user_id: Uuid,
        claimed: Decimal,
        balance: Decimal,
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

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, turning each event into a structured log line.
/// Downstream consumers (loyalty accrual, notifications) subscribe here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::PaymentIntentCreated {
                order_id,
                payment_intent_id,
            } => {
                info!(order_id = %order_id, payment_intent_id = %payment_intent_id, "event: payment intent created");
            }
            Event::PaymentSetupFailed { order_id, reason } => {
                warn!(order_id = %order_id, reason = %reason, "event: payment setup failed");
            }
            Event::WalletCreditApplied {
                order_id,
                user_id,
                amount,
            } => {
                info!(order_id = %order_id, user_id = %user_id, amount = %amount, "event: wallet credit applied");
            }
            Event::WalletOverclaimAttempted {
                user_id,
                claimed,
                balance,
            } => {
                warn!(user_id = %user_id, claimed = %claimed, balance = %balance, "event: wallet overclaim attempted");
            }
        }
    }
    info!("Event channel closed; event processor exiting");
}
