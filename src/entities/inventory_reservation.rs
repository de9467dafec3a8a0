use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-boxed claim on lot stock on behalf of an order. Terminated by
/// fulfillment, explicit cancellation, or the expiry sweep; at most one of
/// `fulfilled_at` / `canceled_at` is ever set.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub lot_id: Uuid,
    pub quantity_reserved: i32,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_lot::Entity",
        from = "Column::LotId",
        to = "super::inventory_lot::Column::Id"
    )]
    InventoryLot,
}

impl Related<super::inventory_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryLot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A reservation still holding stock: neither fulfilled nor canceled.
    pub fn is_open(&self) -> bool {
        self.fulfilled_at.is_none() && self.canceled_at.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
