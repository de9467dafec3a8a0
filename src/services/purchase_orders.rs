use chrono::{NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus};
use crate::entities::purchase_order_item::{self, Entity as PurchaseOrderItemEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// One requested line of a new purchase order.
#[derive(Debug, Clone)]
pub struct PurchaseOrderLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_cost_cents: i64,
}

/// Overhead costs attached to a purchase order; apportioned across received
/// units during receiving.
#[derive(Debug, Clone, Default)]
pub struct OverheadCosts {
    pub shipping_cost_cents: i64,
    pub customs_duty_cents: i64,
    pub other_fees_cents: i64,
}

impl OverheadCosts {
    pub fn total_cents(&self) -> i64 {
        self.shipping_cost_cents + self.customs_duty_cents + self.other_fees_cents
    }
}

#[derive(Debug, Clone)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: Uuid,
    pub items: Vec<PurchaseOrderLineInput>,
    pub overhead: OverheadCosts,
    pub notes: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
}

/// Service for managing the purchase order lifecycle. Creating and
/// submitting a PO has no inventory side effects; stock only moves at
/// receiving time.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl PurchaseOrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a purchase order with its line items in status DRAFT.
    #[instrument(skip(self, input), fields(supplier_id = %input.supplier_id))]
    pub async fn create_purchase_order(
        &self,
        input: CreatePurchaseOrderInput,
    ) -> Result<(purchase_order::Model, Vec<purchase_order_item::Model>), ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Purchase order must have at least one line item".to_string(),
            ));
        }
        for line in &input.items {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Line quantity must be positive, got {} for product {}",
                    line.quantity, line.product_id
                )));
            }
            if line.unit_cost_cents <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Unit cost must be positive, got {} for product {}",
                    line.unit_cost_cents, line.product_id
                )));
            }
        }

        let subtotal_cents: i64 = input
            .items
            .iter()
            .map(|line| line.unit_cost_cents * i64::from(line.quantity))
            .sum();
        let total_cost_cents = subtotal_cents + input.overhead.total_cents();

        let now = Utc::now();
        let po_id = Uuid::new_v4();
        let po_number = generate_po_number();

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let po = purchase_order::ActiveModel {
            id: Set(po_id),
            po_number: Set(po_number.clone()),
            supplier_id: Set(input.supplier_id),
            status: Set(PurchaseOrderStatus::Draft.as_str().to_string()),
            subtotal_cents: Set(subtotal_cents),
            shipping_cost_cents: Set(input.overhead.shipping_cost_cents),
            customs_duty_cents: Set(input.overhead.customs_duty_cents),
            other_fees_cents: Set(input.overhead.other_fees_cents),
            total_cost_cents: Set(total_cost_cents),
            notes: Set(input.notes),
            expected_delivery_date: Set(input.expected_delivery_date),
            actual_delivery_date: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let po = po.insert(&txn).await.map_err(ServiceError::db_error)?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in input.items {
            let item = purchase_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(po_id),
                product_id: Set(line.product_id),
                quantity_ordered: Set(line.quantity),
                quantity_received: Set(0),
                unit_cost_cents: Set(line.unit_cost_cents),
                created_at: Set(now),
                updated_at: Set(now),
            };
            items.push(item.insert(&txn).await.map_err(ServiceError::db_error)?);
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(po_number = %po_number, total_cost_cents, "Purchase order created");
        self.event_sender
            .send_or_log(Event::PurchaseOrderCreated(po_id))
            .await;

        Ok((po, items))
    }

    /// Submits a DRAFT purchase order to its supplier. Notification delivery
    /// is an event consumer's concern.
    #[instrument(skip(self))]
    pub async fn submit_purchase_order(
        &self,
        po_id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        let updated = self
            .transition(po_id, PurchaseOrderStatus::Submitted)
            .await?;

        self.event_sender
            .send_or_log(Event::PurchaseOrderSubmitted {
                po_id,
                supplier_id: updated.supplier_id,
            })
            .await;

        Ok(updated)
    }

    /// Marks a SUBMITTED purchase order as confirmed by the supplier.
    #[instrument(skip(self))]
    pub async fn confirm_purchase_order(
        &self,
        po_id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(po_id, PurchaseOrderStatus::Confirmed).await
    }

    /// Marks a CONFIRMED purchase order as shipped by the supplier.
    #[instrument(skip(self))]
    pub async fn mark_shipped(&self, po_id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        self.transition(po_id, PurchaseOrderStatus::Shipped).await
    }

    /// Cancels a purchase order. Legal only before supplier confirmation.
    #[instrument(skip(self))]
    pub async fn cancel_purchase_order(
        &self,
        po_id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        let updated = self
            .transition(po_id, PurchaseOrderStatus::Cancelled)
            .await?;

        self.event_sender
            .send_or_log(Event::PurchaseOrderCancelled(po_id))
            .await;

        Ok(updated)
    }

    /// Gets a purchase order with its line items.
    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        po_id: Uuid,
    ) -> Result<(purchase_order::Model, Vec<purchase_order_item::Model>), ServiceError> {
        let db = &*self.db;

        let po = PurchaseOrderEntity::find_by_id(po_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;

        let items = PurchaseOrderItemEntity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(po_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((po, items))
    }

    /// Lists purchase orders by status, newest first.
    #[instrument(skip(self))]
    pub async fn list_by_status(
        &self,
        status: PurchaseOrderStatus,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let query = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::Status.eq(status.as_str()))
            .order_by_desc(purchase_order::Column::CreatedAt);
        self.fetch_page(query, page, limit).await
    }

    /// Lists purchase orders placed with a supplier, newest first.
    #[instrument(skip(self))]
    pub async fn list_by_supplier(
        &self,
        supplier_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let query = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::SupplierId.eq(supplier_id))
            .order_by_desc(purchase_order::Column::CreatedAt);
        self.fetch_page(query, page, limit).await
    }

    async fn fetch_page(
        &self,
        query: sea_orm::Select<PurchaseOrderEntity>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let limit = limit.clamp(1, 100);
        let paginator = query.paginate(&*self.db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((orders, total))
    }

    async fn transition(
        &self,
        po_id: Uuid,
        next: PurchaseOrderStatus,
    ) -> Result<purchase_order::Model, ServiceError> {
        let db = &*self.db;

        let po = PurchaseOrderEntity::find_by_id(po_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;

        let current = PurchaseOrderStatus::from_str(&po.status).ok_or_else(|| {
            ServiceError::InternalError(format!("Unknown purchase order status '{}'", po.status))
        })?;

        if !current.can_transition_to(next) {
            warn!(
                po_id = %po_id,
                from = current.as_str(),
                to = next.as_str(),
                "Rejected illegal purchase order transition"
            );
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move purchase order {} from {} to {}",
                po.po_number,
                current.as_str(),
                next.as_str()
            )));
        }

        let mut active: purchase_order::ActiveModel = po.into();
        active.status = Set(next.as_str().to_string());
        active.updated_at = Set(Utc::now());

        active.update(db).await.map_err(ServiceError::db_error)
    }
}

/// Generates a human-readable PO number, e.g. `PO-20260827-X4T9QB`.
fn generate_po_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("PO-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}
