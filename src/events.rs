use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the inventory core. External collaborators (supplier
/// notification, order service callbacks) subscribe through the processing
/// loop; the core only emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Purchase order events
    PurchaseOrderCreated(Uuid),
    PurchaseOrderSubmitted {
        po_id: Uuid,
        supplier_id: Uuid,
    },
    PurchaseOrderCancelled(Uuid),
    PurchaseOrderReceived {
        po_id: Uuid,
        receiving_id: Uuid,
        qc_passed: bool,
    },

    // Lot ledger events
    LotReceived {
        lot_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        quarantined: bool,
    },

    // Allocation / reservation events
    InventoryAllocated {
        product_id: Uuid,
        quantity: i32,
        lots: Vec<Uuid>,
    },
    InventoryReserved {
        order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        expires_at: DateTime<Utc>,
    },
    ReservationFulfilled {
        order_id: Uuid,
        fulfilled_count: usize,
    },
    ReservationCancelled {
        order_id: Uuid,
        released_quantity: i64,
    },
    ReservationsExpired {
        released_count: usize,
        released_quantity: i64,
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

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Business operations must not fail because a consumer went away.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropped event: {}", e);
        }
    }
}

/// Processes incoming events. Side-effect delivery (supplier notification,
/// webhooks) hangs off this loop so the transactional core stays pure.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PurchaseOrderSubmitted { po_id, supplier_id } => {
                // Supplier notification is delegated to an external
                // integration; log until one is registered.
                info!(%po_id, %supplier_id, "Purchase order submitted; supplier notification queued");
            }
            Event::ReservationsExpired {
                released_count,
                released_quantity,
            } => {
                info!(
                    released_count,
                    released_quantity, "Expired reservations released"
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
