use chrono::{NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::inventory_lot::{self, LotStatus};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus};
use crate::entities::purchase_order_item::{self, Entity as PurchaseOrderItemEntity};
use crate::entities::receiving_workflow::{
    self, Discrepancy, Entity as ReceivingWorkflowEntity, ReceivingStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// One physically received line of a purchase order.
#[derive(Debug, Clone)]
pub struct ReceivedItemInput {
    pub product_id: Uuid,
    pub quantity_received: i32,
    pub expiry_date: Option<NaiveDate>,
}

/// Outcome of a completed receipt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompletedReceipt {
    pub workflow: receiving_workflow::Model,
    pub lots: Vec<inventory_lot::Model>,
    pub discrepancies: Vec<Discrepancy>,
}

/// Converts purchase orders into lot-ledger entries, apportioning overhead
/// into per-unit landed cost and keeping the product aggregate in sync.
#[derive(Clone)]
pub struct ReceivingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ReceivingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Opens a receiving workflow against a CONFIRMED or SHIPPED purchase order.
    #[instrument(skip(self))]
    pub async fn start_receiving(
        &self,
        po_id: Uuid,
        received_by: Option<String>,
    ) -> Result<receiving_workflow::Model, ServiceError> {
        let db = &*self.db;

        let po = PurchaseOrderEntity::find_by_id(po_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;

        let status = PurchaseOrderStatus::from_str(&po.status).ok_or_else(|| {
            ServiceError::InternalError(format!("Unknown purchase order status '{}'", po.status))
        })?;

        if !matches!(
            status,
            PurchaseOrderStatus::Confirmed | PurchaseOrderStatus::Shipped
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot receive purchase order {} in status {}",
                po.po_number,
                status.as_str()
            )));
        }

        let now = Utc::now();
        let workflow = receiving_workflow::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_order_id: Set(po_id),
            status: Set(ReceivingStatus::InProgress.as_str().to_string()),
            received_by: Set(received_by),
            qc_notes: Set(None),
            discrepancies: Set(serde_json::json!([])),
            started_at: Set(now),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = workflow.insert(db).await.map_err(ServiceError::db_error)?;
        info!(receiving_id = %created.id, po_id = %po_id, "Receiving workflow started");
        Ok(created)
    }

    /// Completes a receipt: creates one lot per matched line, spreads the
    /// PO's overhead evenly across every received unit, records
    /// discrepancies, and advances the PO to RECEIVED. The whole call is one
    /// transaction; either every lot and aggregate update commits or none do.
    #[instrument(skip(self, received_items))]
    pub async fn complete_receiving(
        &self,
        receiving_id: Uuid,
        received_items: Vec<ReceivedItemInput>,
        qc_passed: bool,
        qc_notes: Option<String>,
    ) -> Result<CompletedReceipt, ServiceError> {
        for item in &received_items {
            if item.quantity_received < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Received quantity cannot be negative, got {} for product {}",
                    item.quantity_received, item.product_id
                )));
            }
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let workflow = ReceivingWorkflowEntity::find_by_id(receiving_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Receiving workflow {} not found", receiving_id))
            })?;

        match ReceivingStatus::from_str(&workflow.status) {
            Some(ReceivingStatus::InProgress) => {}
            _ => {
                return Err(ServiceError::InvalidStatus(format!(
                    "Receiving workflow {} is not in progress",
                    receiving_id
                )));
            }
        }

        let po_id = workflow.purchase_order_id;
        let po = PurchaseOrderEntity::find_by_id(po_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;

        let po_lines = PurchaseOrderItemEntity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(po_id))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        // Match received items against PO lines up front; an unmatched item
        // is a data-integrity warning, not a failure.
        let mut matched: Vec<(&ReceivedItemInput, purchase_order_item::Model)> = Vec::new();
        for item in &received_items {
            match po_lines
                .iter()
                .find(|line| line.product_id == item.product_id)
            {
                Some(line) => matched.push((item, line.clone())),
                None => {
                    warn!(
                        receiving_id = %receiving_id,
                        product_id = %item.product_id,
                        "Received item has no matching purchase order line; skipping"
                    );
                }
            }
        }

        let total_units_received: i64 = matched
            .iter()
            .map(|(item, _)| i64::from(item.quantity_received))
            .sum();

        // Overhead spread evenly by unit count across all products, floored.
        let total_overhead_cents =
            po.shipping_cost_cents + po.customs_duty_cents + po.other_fees_cents;
        let overhead_per_unit_cents = landed_overhead_per_unit(total_overhead_cents, total_units_received);

        let now = Utc::now();
        let mut discrepancies = Vec::new();
        let mut lots = Vec::new();

        for (item, line) in matched {
            if let Some(discrepancy) = Discrepancy::detect(
                item.product_id,
                line.quantity_ordered,
                item.quantity_received,
            ) {
                discrepancies.push(discrepancy);
            }

            if item.quantity_received == 0 {
                continue;
            }

            let lot = inventory_lot::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(item.product_id),
                supplier_id: Set(Some(po.supplier_id)),
                purchase_order_id: Set(Some(po_id)),
                lot_number: Set(generate_lot_number()),
                quantity_received: Set(item.quantity_received),
                quantity_available: Set(item.quantity_received),
                quantity_reserved: Set(0),
                quantity_allocated: Set(0),
                cost_per_unit_cents: Set(line.unit_cost_cents),
                landed_cost_per_unit_cents: Set(line.unit_cost_cents + overhead_per_unit_cents),
                received_date: Set(now),
                expiry_date: Set(item.expiry_date),
                status: Set(if qc_passed {
                    LotStatus::Available.as_str().to_string()
                } else {
                    LotStatus::Quarantine.as_str().to_string()
                }),
                created_at: Set(now),
                updated_at: Set(now),
            };
            lots.push(lot.insert(&txn).await.map_err(ServiceError::db_error)?);

            let received_so_far = line.quantity_received;
            let mut line_active: purchase_order_item::ActiveModel = line.into();
            line_active.quantity_received = Set(received_so_far + item.quantity_received);
            line_active.updated_at = Set(now);
            line_active
                .update(&txn)
                .await
                .map_err(ServiceError::db_error)?;

            // Quarantined stock is excluded from the sellable aggregate.
            if qc_passed {
                increment_product_stock(&txn, item.product_id, item.quantity_received).await?;
            }
        }

        let mut workflow_active: receiving_workflow::ActiveModel = workflow.into();
        workflow_active.status = Set(if qc_passed {
            ReceivingStatus::Completed.as_str().to_string()
        } else {
            ReceivingStatus::QcFailed.as_str().to_string()
        });
        workflow_active.qc_notes = Set(qc_notes);
        workflow_active.discrepancies = Set(serde_json::to_value(&discrepancies)
            .map_err(|e| ServiceError::InternalError(format!("Failed to encode discrepancies: {}", e)))?);
        workflow_active.completed_at = Set(Some(now));
        workflow_active.updated_at = Set(now);
        let workflow = workflow_active
            .update(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let po_status = PurchaseOrderStatus::from_str(&po.status).ok_or_else(|| {
            ServiceError::InternalError(format!("Unknown purchase order status '{}'", po.status))
        })?;
        if !po_status.can_transition_to(PurchaseOrderStatus::Received) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot mark purchase order {} received from status {}",
                po.po_number,
                po_status.as_str()
            )));
        }
        let mut po_active: purchase_order::ActiveModel = po.into();
        po_active.status = Set(PurchaseOrderStatus::Received.as_str().to_string());
        po_active.actual_delivery_date = Set(Some(now));
        po_active.updated_at = Set(now);
        po_active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        for lot in &lots {
            self.event_sender
                .send_or_log(Event::LotReceived {
                    lot_id: lot.id,
                    product_id: lot.product_id,
                    quantity: lot.quantity_received,
                    quarantined: !qc_passed,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::PurchaseOrderReceived {
                po_id,
                receiving_id,
                qc_passed,
            })
            .await;

        info!(
            receiving_id = %receiving_id,
            lots = lots.len(),
            discrepancies = discrepancies.len(),
            qc_passed,
            "Receiving completed"
        );

        Ok(CompletedReceipt {
            workflow,
            lots,
            discrepancies,
        })
    }
}

/// Evenly spread overhead per received unit, floored; zero when nothing was
/// received.
fn landed_overhead_per_unit(total_overhead_cents: i64, total_units: i64) -> i64 {
    if total_units <= 0 {
        0
    } else {
        total_overhead_cents / total_units
    }
}

async fn increment_product_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: i32,
) -> Result<(), ServiceError> {
    // Concurrent receipts for the same product both read-modify-write this
    // aggregate; lock the row so neither increment is lost.
    let product = ProductEntity::find_by_id(product_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    match product {
        Some(product) => {
            let new_quantity = product.stock_quantity + delta;
            let mut active: product::ActiveModel = product.into();
            active.stock_quantity = Set(new_quantity);
            active.updated_at = Set(Utc::now());
            active.update(conn).await.map_err(ServiceError::db_error)?;
            Ok(())
        }
        None => {
            // The aggregate is a denormalized convenience; a missing catalog
            // row must not fail the receipt.
            warn!(product_id = %product_id, "Product missing from catalog; aggregate stock not updated");
            Ok(())
        }
    }
}

/// Generates a traceability lot number, e.g. `LOT-20260827-K2N8DW`.
fn generate_lot_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("LOT-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}
