use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::inventory_lot::{self, Entity as InventoryLotEntity, LotStatus};
use crate::entities::inventory_reservation::{self, Entity as InventoryReservationEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::allocation::{
    apply_draws, lock_candidate_lots, plan_lot_draws, AllocationStrategy, CommitBucket,
};

/// One requested product line of an order reservation.
#[derive(Debug, Clone)]
pub struct ReserveItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Outcome of an expiry sweep pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepResult {
    pub released_count: usize,
    pub released_quantity: i64,
    pub swept_at: DateTime<Utc>,
}

/// Places, fulfills, cancels, and expires time-boxed holds on lot stock.
///
/// A reservation parks units in the lot's `quantity_reserved` bucket and
/// records one row per (order, lot) draw. Holds that neither fulfill nor
/// cancel in time are returned to the pool by [`release_expired_reservations`].
///
/// [`release_expired_reservations`]: ReservationService::release_expired_reservations
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    ttl_minutes: i64,
}

impl ReservationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, ttl_minutes: i64) -> Self {
        Self {
            db,
            event_sender,
            ttl_minutes,
        }
    }

    /// Reserves stock for every line of an order in a single transaction.
    /// If any line cannot be covered in full, nothing is written and the
    /// error names the first shortfall.
    #[instrument(skip(self, items), fields(order_id = %order_id, lines = items.len()))]
    pub async fn reserve_inventory(
        &self,
        order_id: Uuid,
        items: Vec<ReserveItemInput>,
        strategy: AllocationStrategy,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Reservation must cover at least one product".to_string(),
            ));
        }
        for item in &items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Reservation quantity must be positive, got {} for product {}",
                    item.quantity, item.product_id
                )));
            }
        }

        let now = Utc::now();
        let expires_at = now + Duration::minutes(self.ttl_minutes);

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let mut reservations = Vec::new();
        for item in &items {
            let candidates = lock_candidate_lots(&txn, item.product_id, strategy).await?;
            let plan = plan_lot_draws(&candidates, item.quantity)?;
            let draws = apply_draws(&txn, candidates, &plan, CommitBucket::Reserved).await?;

            for draw in &draws {
                let row = inventory_reservation::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(item.product_id),
                    lot_id: Set(draw.lot_id),
                    quantity_reserved: Set(draw.quantity),
                    reserved_at: Set(now),
                    expires_at: Set(expires_at),
                    fulfilled_at: Set(None),
                    canceled_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                reservations.push(row.insert(&txn).await.map_err(ServiceError::db_error)?);
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        for item in &items {
            self.event_sender
                .send_or_log(Event::InventoryReserved {
                    order_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    expires_at,
                })
                .await;
        }
        info!(order_id = %order_id, rows = reservations.len(), %expires_at, "Inventory reserved");

        Ok(reservations)
    }

    /// Marks every open reservation for an order as fulfilled. The reserved
    /// units are now consumed; they stay out of the available pool for good.
    #[instrument(skip(self))]
    pub async fn fulfill_reservation(&self, order_id: Uuid) -> Result<usize, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let open = open_reservations_for_order(&txn, order_id).await?;
        if open.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "No open reservations for order {}",
                order_id
            )));
        }

        let fulfilled_count = open.len();
        for row in open {
            let mut active: inventory_reservation::ActiveModel = row.into();
            active.fulfilled_at = Set(Some(now));
            active.updated_at = Set(now);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::ReservationFulfilled {
                order_id,
                fulfilled_count,
            })
            .await;
        info!(order_id = %order_id, fulfilled_count, "Reservations fulfilled");

        Ok(fulfilled_count)
    }

    /// Cancels every open reservation for an order, returning the held units
    /// to their lots' available pools.
    #[instrument(skip(self))]
    pub async fn cancel_reservation(&self, order_id: Uuid) -> Result<i64, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let open = open_reservations_for_order(&txn, order_id).await?;
        if open.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "No open reservations for order {}",
                order_id
            )));
        }

        let mut released_quantity = 0i64;
        for row in open {
            released_quantity += i64::from(row.quantity_reserved);
            release_hold(&txn, &row, now).await?;

            let mut active: inventory_reservation::ActiveModel = row.into();
            active.canceled_at = Set(Some(now));
            active.updated_at = Set(now);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::ReservationCancelled {
                order_id,
                released_quantity,
            })
            .await;
        info!(order_id = %order_id, released_quantity, "Reservations canceled");

        Ok(released_quantity)
    }

    /// Releases every open reservation whose deadline has passed. Safe to
    /// run on any schedule: terminal rows never match the open filter, so a
    /// second pass over the same data is a no-op.
    #[instrument(skip(self))]
    pub async fn release_expired_reservations(&self) -> Result<SweepResult, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let expired = InventoryReservationEntity::find()
            .filter(inventory_reservation::Column::FulfilledAt.is_null())
            .filter(inventory_reservation::Column::CanceledAt.is_null())
            .filter(inventory_reservation::Column::ExpiresAt.lt(now))
            .order_by_asc(inventory_reservation::Column::ExpiresAt)
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let released_count = expired.len();
        let mut released_quantity = 0i64;

        for row in expired {
            released_quantity += i64::from(row.quantity_reserved);
            release_hold(&txn, &row, now).await?;

            let mut active: inventory_reservation::ActiveModel = row.into();
            active.canceled_at = Set(Some(now));
            active.updated_at = Set(now);
            active.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        if released_count > 0 {
            info!(released_count, released_quantity, "Expired reservations released");
            self.event_sender
                .send_or_log(Event::ReservationsExpired {
                    released_count,
                    released_quantity,
                })
                .await;
        }

        Ok(SweepResult {
            released_count,
            released_quantity,
            swept_at: now,
        })
    }

    /// Lists all reservation rows for an order, open and terminal alike.
    #[instrument(skip(self))]
    pub async fn get_reservations_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
        InventoryReservationEntity::find()
            .filter(inventory_reservation::Column::OrderId.eq(order_id))
            .order_by_asc(inventory_reservation::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}

async fn open_reservations_for_order<C: sea_orm::ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
    InventoryReservationEntity::find()
        .filter(inventory_reservation::Column::OrderId.eq(order_id))
        .filter(inventory_reservation::Column::FulfilledAt.is_null())
        .filter(inventory_reservation::Column::CanceledAt.is_null())
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Moves a hold's units from the lot's reserved bucket back to available and
/// revives a drained lot.
async fn release_hold<C: sea_orm::ConnectionTrait>(
    conn: &C,
    reservation: &inventory_reservation::Model,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    // Allocation decrements this lot under its own row lock; take the same
    // lock here so the counters below are never computed from a stale read.
    let lot = InventoryLotEntity::find_by_id(reservation.lot_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let Some(lot) = lot else {
        // Lots are never deleted, so a dangling reservation is corruption
        // worth surfacing but not worth wedging the sweep over.
        warn!(
            reservation_id = %reservation.id,
            lot_id = %reservation.lot_id,
            "Reservation points at a missing lot; units not returned"
        );
        return Ok(());
    };

    let quantity = reservation.quantity_reserved;
    let new_reserved = lot.quantity_reserved - quantity;
    if new_reserved < 0 {
        return Err(ServiceError::InternalError(format!(
            "Lot {} reserved bucket would go negative releasing reservation {}",
            lot.id, reservation.id
        )));
    }

    let revive = LotStatus::from_str(&lot.status) == Some(LotStatus::Depleted);
    let mut active: inventory_lot::ActiveModel = lot.clone().into();
    active.quantity_reserved = Set(new_reserved);
    active.quantity_available = Set(lot.quantity_available + quantity);
    if revive {
        active.status = Set(LotStatus::Available.as_str().to_string());
    }
    active.updated_at = Set(now);
    active.update(conn).await.map_err(ServiceError::db_error)?;

    Ok(())
}
