use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Uuid,
    pub status: String,
    pub subtotal_cents: i64,
    pub shipping_cost_cents: i64,
    pub customs_duty_cents: i64,
    pub other_fees_cents: i64,
    pub total_cost_cents: i64,
    pub notes: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_order_item::Entity")]
    PurchaseOrderItems,
    #[sea_orm(has_many = "super::receiving_workflow::Entity")]
    ReceivingWorkflows,
}

impl Related<super::purchase_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderItems.def()
    }
}

impl Related<super::receiving_workflow::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReceivingWorkflows.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Purchase order lifecycle. Transitions are monotonic; there is no path
/// back from any status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    Confirmed,
    Shipped,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "DRAFT",
            PurchaseOrderStatus::Submitted => "SUBMITTED",
            PurchaseOrderStatus::Confirmed => "CONFIRMED",
            PurchaseOrderStatus::Shipped => "SHIPPED",
            PurchaseOrderStatus::Received => "RECEIVED",
            PurchaseOrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(PurchaseOrderStatus::Draft),
            "SUBMITTED" => Some(PurchaseOrderStatus::Submitted),
            "CONFIRMED" => Some(PurchaseOrderStatus::Confirmed),
            "SHIPPED" => Some(PurchaseOrderStatus::Shipped),
            "RECEIVED" => Some(PurchaseOrderStatus::Received),
            "CANCELLED" => Some(PurchaseOrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Confirmed)
                | (Confirmed, Shipped)
                | (Confirmed, Received)
                | (Shipped, Received)
                | (Draft, Cancelled)
                | (Submitted, Cancelled)
        )
    }
}
