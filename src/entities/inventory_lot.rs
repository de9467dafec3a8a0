use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physically distinct receiving batch of one product. Created exactly once
/// by the receiving workflow, mutated only by allocation and reservation,
/// never deleted.
///
/// Invariant for every row:
/// `quantity_available + quantity_reserved + quantity_allocated == quantity_received`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub purchase_order_id: Option<Uuid>,
    pub lot_number: String,
    pub quantity_received: i32,
    pub quantity_available: i32,
    pub quantity_reserved: i32,
    pub quantity_allocated: i32,
    pub cost_per_unit_cents: i64,
    pub landed_cost_per_unit_cents: i64,
    pub received_date: DateTime<Utc>,
    pub expiry_date: Option<NaiveDate>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::purchase_order::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_order::Column::Id"
    )]
    PurchaseOrder,
    #[sea_orm(has_many = "super::inventory_reservation::Entity")]
    InventoryReservations,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl Related<super::inventory_reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryReservations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lot lifecycle. No operation stamps EXPIRED automatically; allocation
/// candidacy checks `expiry_date` directly, so the status exists for manual
/// stock-control adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStatus {
    Available,
    Reserved,
    Depleted,
    Expired,
    Quarantine,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Available => "AVAILABLE",
            LotStatus::Reserved => "RESERVED",
            LotStatus::Depleted => "DEPLETED",
            LotStatus::Expired => "EXPIRED",
            LotStatus::Quarantine => "QUARANTINE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(LotStatus::Available),
            "RESERVED" => Some(LotStatus::Reserved),
            "DEPLETED" => Some(LotStatus::Depleted),
            "EXPIRED" => Some(LotStatus::Expired),
            "QUARANTINE" => Some(LotStatus::Quarantine),
            _ => None,
        }
    }
}

impl Model {
    /// The conservation invariant every mutation must preserve.
    pub fn quantities_balance(&self) -> bool {
        self.quantity_available + self.quantity_reserved + self.quantity_allocated
            == self.quantity_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            LotStatus::Available,
            LotStatus::Reserved,
            LotStatus::Depleted,
            LotStatus::Expired,
            LotStatus::Quarantine,
        ] {
            assert_eq!(LotStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(LotStatus::from_str("CONSUMED"), None);
    }
}
