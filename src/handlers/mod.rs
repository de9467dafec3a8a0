use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::allocation::AllocationService;
use crate::services::inventory::InventoryService;
use crate::services::purchase_orders::PurchaseOrderService;
use crate::services::receiving::ReceivingService;
use crate::services::reservations::ReservationService;

pub mod inventory;
pub mod purchase_orders;
pub mod receiving;
pub mod reservations;

/// All business services, constructed once and cloned into the router state.
#[derive(Clone)]
pub struct AppServices {
    pub purchase_orders: PurchaseOrderService,
    pub receiving: ReceivingService,
    pub allocation: AllocationService,
    pub reservations: ReservationService,
    pub inventory: InventoryService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, config: &AppConfig) -> Self {
        Self {
            purchase_orders: PurchaseOrderService::new(db.clone(), event_sender.clone()),
            receiving: ReceivingService::new(db.clone(), event_sender.clone()),
            allocation: AllocationService::new(db.clone(), event_sender.clone()),
            reservations: ReservationService::new(
                db.clone(),
                event_sender,
                config.reservation_ttl_minutes,
            ),
            inventory: InventoryService::new(db),
        }
    }
}
