use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::inventory_lot::{self, Entity as InventoryLotEntity, LotStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Order in which candidate lots are consumed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum AllocationStrategy {
    /// Oldest received first.
    #[default]
    Fifo,
    /// Earliest expiry first; lots without an expiry date are skipped.
    Fefo,
    /// Newest received first.
    Lifo,
}

/// A planned or committed draw against one lot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub lot_number: String,
    pub quantity: i32,
    pub cost_per_unit_cents: i64,
    pub landed_cost_per_unit_cents: i64,
}

/// Which lot bucket a draw commits units into. Standalone allocation and
/// order reservation draw from the same available pool but settle into
/// disjoint buckets, so a unit is never counted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommitBucket {
    Allocated,
    Reserved,
}

/// Commits available lot stock for immediate use (picking, transfer,
/// manufacturing issue) under a configurable consumption strategy.
#[derive(Clone)]
pub struct AllocationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl AllocationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Allocates `quantity` units of a product across lots in strategy
    /// order. The plan is built first against locked rows; on any shortfall
    /// the call fails with the achievable total and writes nothing.
    #[instrument(skip(self))]
    pub async fn allocate_inventory(
        &self,
        product_id: Uuid,
        quantity: i32,
        strategy: AllocationStrategy,
    ) -> Result<Vec<LotDraw>, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Allocation quantity must be positive, got {}",
                quantity
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let candidates = lock_candidate_lots(&txn, product_id, strategy).await?;
        let plan = plan_lot_draws(&candidates, quantity)?;
        let draws = apply_draws(&txn, candidates, &plan, CommitBucket::Allocated).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            product_id = %product_id,
            quantity,
            strategy = %strategy,
            lots = draws.len(),
            "Inventory allocated"
        );
        self.event_sender
            .send_or_log(Event::InventoryAllocated {
                product_id,
                quantity,
                lots: draws.iter().map(|d| d.lot_id).collect(),
            })
            .await;

        Ok(draws)
    }
}

/// Loads the product's consumable lots in strategy order, exclusively
/// locked for the life of the surrounding transaction. Only AVAILABLE lots
/// with stock on hand and no lapsed expiry qualify; FEFO additionally
/// requires an expiry date.
pub(crate) async fn lock_candidate_lots<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    strategy: AllocationStrategy,
) -> Result<Vec<inventory_lot::Model>, ServiceError> {
    let today = Utc::now().date_naive();
    let mut query = InventoryLotEntity::find()
        .filter(inventory_lot::Column::ProductId.eq(product_id))
        .filter(inventory_lot::Column::Status.eq(LotStatus::Available.as_str()))
        .filter(inventory_lot::Column::QuantityAvailable.gt(0))
        .filter(
            Condition::any()
                .add(inventory_lot::Column::ExpiryDate.is_null())
                .add(inventory_lot::Column::ExpiryDate.gte(today)),
        );

    query = match strategy {
        AllocationStrategy::Fifo => query
            .order_by_asc(inventory_lot::Column::ReceivedDate)
            .order_by_asc(inventory_lot::Column::CreatedAt),
        AllocationStrategy::Fefo => query
            .filter(inventory_lot::Column::ExpiryDate.is_not_null())
            .order_by_asc(inventory_lot::Column::ExpiryDate)
            .order_by_asc(inventory_lot::Column::ReceivedDate),
        AllocationStrategy::Lifo => query
            .order_by_desc(inventory_lot::Column::ReceivedDate)
            .order_by_desc(inventory_lot::Column::CreatedAt),
    };

    // No-op on sqlite, which serializes writers anyway.
    query
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Walks candidates in order, taking as much as each lot holds. Pure
/// planning: errors with the achievable total on shortfall, touches nothing.
pub(crate) fn plan_lot_draws(
    candidates: &[inventory_lot::Model],
    quantity: i32,
) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let mut remaining = quantity;
    let mut plan = Vec::new();

    for lot in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.quantity_available);
        if take > 0 {
            plan.push((lot.id, take));
            remaining -= take;
        }
    }

    if remaining > 0 {
        return Err(ServiceError::InsufficientInventory {
            needed: quantity,
            allocated: quantity - remaining,
        });
    }

    Ok(plan)
}

/// Applies a plan produced by [`plan_lot_draws`] over the same candidate
/// set: moves units out of `quantity_available` into the chosen bucket and
/// marks drained lots DEPLETED.
pub(crate) async fn apply_draws<C: ConnectionTrait>(
    conn: &C,
    candidates: Vec<inventory_lot::Model>,
    plan: &[(Uuid, i32)],
    bucket: CommitBucket,
) -> Result<Vec<LotDraw>, ServiceError> {
    let now = Utc::now();
    let mut draws = Vec::with_capacity(plan.len());

    for (lot_id, take) in plan {
        let lot = candidates
            .iter()
            .find(|l| l.id == *lot_id)
            .ok_or_else(|| {
                ServiceError::InternalError(format!("Planned lot {} missing from candidates", lot_id))
            })?
            .clone();

        draws.push(LotDraw {
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            quantity: *take,
            cost_per_unit_cents: lot.cost_per_unit_cents,
            landed_cost_per_unit_cents: lot.landed_cost_per_unit_cents,
        });

        let new_available = lot.quantity_available - take;
        let mut active: inventory_lot::ActiveModel = lot.clone().into();
        active.quantity_available = Set(new_available);
        match bucket {
            CommitBucket::Allocated => {
                active.quantity_allocated = Set(lot.quantity_allocated + take);
            }
            CommitBucket::Reserved => {
                active.quantity_reserved = Set(lot.quantity_reserved + take);
            }
        }
        if new_available == 0 {
            active.status = Set(LotStatus::Depleted.as_str().to_string());
        }
        active.updated_at = Set(now);
        active.update(conn).await.map_err(ServiceError::db_error)?;
    }

    Ok(draws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn lot(quantity_available: i32) -> inventory_lot::Model {
        let now = Utc::now();
        inventory_lot::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            supplier_id: None,
            purchase_order_id: None,
            lot_number: "LOT-TEST".to_string(),
            quantity_received: quantity_available,
            quantity_available,
            quantity_reserved: 0,
            quantity_allocated: 0,
            cost_per_unit_cents: 100,
            landed_cost_per_unit_cents: 110,
            received_date: now,
            expiry_date: None,
            status: LotStatus::Available.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn plan_spans_lots_in_candidate_order() {
        let lots = vec![lot(5), lot(5), lot(5)];
        let plan = plan_lot_draws(&lots, 7).unwrap();
        assert_eq!(plan, vec![(lots[0].id, 5), (lots[1].id, 2)]);
    }

    #[test]
    fn plan_exact_fit_drains_one_lot() {
        let lots = vec![lot(5), lot(3)];
        let plan = plan_lot_draws(&lots, 5).unwrap();
        assert_eq!(plan, vec![(lots[0].id, 5)]);
    }

    #[test]
    fn shortfall_reports_achievable_total() {
        let lots = vec![lot(4), lot(3)];
        let err = plan_lot_draws(&lots, 10).unwrap_err();
        match err {
            ServiceError::InsufficientInventory { needed, allocated } => {
                assert_eq!(needed, 10);
                assert_eq!(allocated, 7);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn empty_candidates_short_everything() {
        let err = plan_lot_draws(&[], 1).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientInventory {
                needed: 1,
                allocated: 0
            }
        ));
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(
            AllocationStrategy::from_str("fefo").unwrap(),
            AllocationStrategy::Fefo
        );
        assert_eq!(
            AllocationStrategy::from_str("LIFO").unwrap(),
            AllocationStrategy::Lifo
        );
        assert!(AllocationStrategy::from_str("RANDOM").is_err());
    }

    #[test]
    fn expired_lot_is_still_a_valid_model() {
        let mut l = lot(2);
        l.expiry_date = Some((Utc::now() - Duration::days(1)).date_naive());
        assert!(l.quantities_balance());
    }
}
