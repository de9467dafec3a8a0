use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::inventory_lot::{self, Entity as InventoryLotEntity};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::ServiceError;

/// Days ahead the summary counts lots as "expiring soon".
const EXPIRY_HORIZON_DAYS: i64 = 30;

/// Per-lot line of an inventory summary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LotSummary {
    pub lot_id: Uuid,
    pub lot_number: String,
    pub status: String,
    pub quantity_available: i32,
    pub quantity_reserved: i32,
    pub quantity_allocated: i32,
    pub landed_cost_per_unit_cents: i64,
    pub expiry_date: Option<chrono::NaiveDate>,
}

/// Roll-up of one product's position across its lots.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InventorySummary {
    pub product_id: Uuid,
    pub total_available: i64,
    pub total_reserved: i64,
    pub total_allocated: i64,
    pub lot_count: usize,
    /// Lots with stock still available whose expiry falls between today and
    /// the horizon. Lots already lapsed or drained are not actionable and
    /// are left out.
    pub expiring_within_30_days: usize,
    /// Quantity-weighted over units still available; `None` with no stock.
    pub average_cost_per_unit_cents: Option<i64>,
    pub average_landed_cost_per_unit_cents: Option<i64>,
    pub lots: Vec<LotSummary>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LowStockProduct {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i32,
    pub reorder_point: Option<i32>,
}

/// Reorder advice for a product. Demand-velocity forecasting needs sales
/// history this service does not ingest, so `has_velocity_data` is always
/// false and the suggestion falls back to the reorder-point shortfall.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReorderSuggestion {
    pub product_id: Uuid,
    pub suggested_quantity: i32,
    pub has_velocity_data: bool,
}

/// Read-side queries over the lot ledger and product aggregates.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Summarizes a product's position: bucket totals, weighted average
    /// costs over available units, near-expiry count, and every lot.
    #[instrument(skip(self))]
    pub async fn get_inventory_summary(
        &self,
        product_id: Uuid,
    ) -> Result<InventorySummary, ServiceError> {
        let lots = InventoryLotEntity::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .order_by_asc(inventory_lot::Column::ReceivedDate)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let horizon = (Utc::now() + Duration::days(EXPIRY_HORIZON_DAYS)).date_naive();
        let today = Utc::now().date_naive();

        let mut total_available = 0i64;
        let mut total_reserved = 0i64;
        let mut total_allocated = 0i64;
        let mut expiring_within_30_days = 0usize;
        let mut cost_weighted = Decimal::ZERO;
        let mut landed_weighted = Decimal::ZERO;
        let mut weight = Decimal::ZERO;

        let mut summaries = Vec::with_capacity(lots.len());
        for lot in &lots {
            total_available += i64::from(lot.quantity_available);
            total_reserved += i64::from(lot.quantity_reserved);
            total_allocated += i64::from(lot.quantity_allocated);

            if let Some(expiry) = lot.expiry_date {
                if expiry >= today && expiry <= horizon && lot.quantity_available > 0 {
                    expiring_within_30_days += 1;
                }
            }

            if lot.quantity_available > 0 {
                let qty = Decimal::from(lot.quantity_available);
                cost_weighted += qty * Decimal::from(lot.cost_per_unit_cents);
                landed_weighted += qty * Decimal::from(lot.landed_cost_per_unit_cents);
                weight += qty;
            }

            summaries.push(LotSummary {
                lot_id: lot.id,
                lot_number: lot.lot_number.clone(),
                status: lot.status.clone(),
                quantity_available: lot.quantity_available,
                quantity_reserved: lot.quantity_reserved,
                quantity_allocated: lot.quantity_allocated,
                landed_cost_per_unit_cents: lot.landed_cost_per_unit_cents,
                expiry_date: lot.expiry_date,
            });
        }

        let (average_cost_per_unit_cents, average_landed_cost_per_unit_cents) =
            if weight > Decimal::ZERO {
                (
                    (cost_weighted / weight).round().to_i64(),
                    (landed_weighted / weight).round().to_i64(),
                )
            } else {
                (None, None)
            };

        Ok(InventorySummary {
            product_id,
            total_available,
            total_reserved,
            total_allocated,
            lot_count: lots.len(),
            expiring_within_30_days,
            average_cost_per_unit_cents,
            average_landed_cost_per_unit_cents,
            lots: summaries,
        })
    }

    /// Products whose aggregate stock has fallen to or under the threshold.
    #[instrument(skip(self))]
    pub async fn get_low_stock_products(
        &self,
        threshold: i32,
    ) -> Result<Vec<LowStockProduct>, ServiceError> {
        let products = ProductEntity::find()
            .filter(product::Column::StockQuantity.lte(threshold))
            .order_by_asc(product::Column::StockQuantity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(products
            .into_iter()
            .map(|p| LowStockProduct {
                product_id: p.id,
                sku: p.sku,
                name: p.name,
                stock_quantity: p.stock_quantity,
                reorder_point: p.reorder_point,
            })
            .collect())
    }

    /// Suggests how much to reorder. Without demand history this is the
    /// shortfall against the product's reorder point, or zero.
    #[instrument(skip(self))]
    pub async fn calculate_reorder_quantity(
        &self,
        product_id: Uuid,
    ) -> Result<ReorderSuggestion, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let suggested_quantity = product
            .reorder_point
            .map(|point| (point - product.stock_quantity).max(0))
            .unwrap_or(0);

        Ok(ReorderSuggestion {
            product_id,
            suggested_quantity,
            has_velocity_data: false,
        })
    }
}
