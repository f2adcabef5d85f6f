use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::entities::stock_movement::MovementReason;

/// Events emitted by the ledger write paths after their transaction
/// commits. Collaborators (notification fan-out, cache invalidation)
/// subscribe to the receiving end of the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    MovementRecorded {
        movement_id: i64,
        shop_id: i64,
        ingredient_id: i64,
        reason: MovementReason,
        change: Decimal,
    },
    TransferRecorded {
        reference: String,
        from_shop_id: i64,
        to_shop_id: i64,
        ingredient_id: i64,
        quantity: Decimal,
    },
    SaleRecorded {
        sale_id: i64,
        shop_id: i64,
        reference: String,
        sold_at: DateTime<Utc>,
    },
    BalanceRecomputed {
        shop_id: i64,
        ingredient_id: i64,
        stock: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Convenience constructor for a bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}
