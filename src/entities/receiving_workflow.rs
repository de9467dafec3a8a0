use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One receipt event against a purchase order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receiving_workflows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub status: String,
    pub received_by: Option<String>,
    pub qc_notes: Option<String>,
    /// Serialized `Vec<Discrepancy>`, written once at completion.
    #[sea_orm(column_type = "Json")]
    pub discrepancies: Json,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_order::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_order::Column::Id"
    )]
    PurchaseOrder,
}

impl Related<super::purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivingStatus {
    InProgress,
    Completed,
    QcFailed,
}

impl ReceivingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceivingStatus::InProgress => "IN_PROGRESS",
            ReceivingStatus::Completed => "COMPLETED",
            ReceivingStatus::QcFailed => "QC_FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(ReceivingStatus::InProgress),
            "COMPLETED" => Some(ReceivingStatus::Completed),
            "QC_FAILED" => Some(ReceivingStatus::QcFailed),
            _ => None,
        }
    }
}

/// Why a received quantity differed from the ordered quantity. A closed set
/// rather than free-form text so downstream consumers can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyReason {
    ShortShipment,
    OverShipment,
}

/// A mismatch between ordered and received quantity for one PO line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub product_id: Uuid,
    pub expected: i32,
    pub received: i32,
    pub reason: DiscrepancyReason,
}

impl Discrepancy {
    /// Compares ordered vs received; equality is not a discrepancy.
    pub fn detect(product_id: Uuid, expected: i32, received: i32) -> Option<Self> {
        use std::cmp::Ordering;
        let reason = match received.cmp(&expected) {
            Ordering::Less => DiscrepancyReason::ShortShipment,
            Ordering::Greater => DiscrepancyReason::OverShipment,
            Ordering::Equal => return None,
        };
        Some(Self {
            product_id,
            expected,
            received,
            reason,
        })
    }
}
