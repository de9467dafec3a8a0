mod common;

use assert_matches::assert_matches;
use common::{days_ago, TestApp};
use lotledger_api::entities::inventory_lot::LotStatus;
use lotledger_api::errors::ServiceError;
use lotledger_api::services::allocation::AllocationStrategy;
use lotledger_api::services::reservations::{ReservationService, ReserveItemInput};
use uuid::Uuid;

fn item(product_id: Uuid, quantity: i32) -> ReserveItemInput {
    ReserveItemInput {
        product_id,
        quantity,
    }
}

/// A reservation service whose holds are already expired by the time the
/// sweep looks at them.
fn zero_ttl_service(app: &TestApp) -> ReservationService {
    ReservationService::new(app.state.db.clone(), app.state.event_sender.clone(), 0)
}

#[tokio::test]
async fn reserve_spans_lots_and_records_rows() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    let first = app.seed_lot(product, 5, days_ago(2), None).await;
    let second = app.seed_lot(product, 5, days_ago(1), None).await;
    let order_id = Uuid::new_v4();

    let rows = app
        .state
        .services
        .reservations
        .reserve_inventory(order_id, vec![item(product, 8)], AllocationStrategy::Fifo)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().map(|r| r.quantity_reserved).sum::<i32>(), 8);
    assert!(rows.iter().all(|r| r.is_open()));
    assert!(rows.iter().all(|r| r.expires_at > r.reserved_at));

    let lots = app.lots_for_product(product).await;
    let first_now = lots.iter().find(|l| l.id == first.id).unwrap();
    assert_eq!(first_now.quantity_reserved, 5);
    assert_eq!(first_now.status, LotStatus::Depleted.as_str());
    let second_now = lots.iter().find(|l| l.id == second.id).unwrap();
    assert_eq!(second_now.quantity_reserved, 3);
    assert_eq!(second_now.quantity_available, 2);

    app.assert_lots_balanced(product).await;
}

#[tokio::test]
async fn multi_item_reservation_is_all_or_nothing() {
    let app = TestApp::new().await;
    let covered = Uuid::new_v4();
    let short = Uuid::new_v4();
    app.seed_lot(covered, 10, days_ago(1), None).await;
    app.seed_lot(short, 2, days_ago(1), None).await;

    let err = app
        .state
        .services
        .reservations
        .reserve_inventory(
            Uuid::new_v4(),
            vec![item(covered, 5), item(short, 3)],
            AllocationStrategy::Fifo,
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientInventory {
            needed: 3,
            allocated: 2
        }
    );

    // The covered product's lot must be untouched.
    let lots = app.lots_for_product(covered).await;
    assert_eq!(lots[0].quantity_reserved, 0);
    assert_eq!(lots[0].quantity_available, 10);
}

#[tokio::test]
async fn fulfill_stamps_rows_and_keeps_units_out_of_pool() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot(product, 10, days_ago(1), None).await;
    let order_id = Uuid::new_v4();

    app.state
        .services
        .reservations
        .reserve_inventory(order_id, vec![item(product, 4)], AllocationStrategy::Fifo)
        .await
        .unwrap();

    let count = app
        .state
        .services
        .reservations
        .fulfill_reservation(order_id)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let rows = app
        .state
        .services
        .reservations
        .get_reservations_for_order(order_id)
        .await
        .unwrap();
    assert!(rows.iter().all(|r| r.fulfilled_at.is_some()));

    // Fulfilled units stay consumed.
    let lots = app.lots_for_product(product).await;
    assert_eq!(lots[0].quantity_reserved, 4);
    assert_eq!(lots[0].quantity_available, 6);
    app.assert_lots_balanced(product).await;

    // No open rows remain to fulfill.
    let err = app
        .state
        .services
        .reservations
        .fulfill_reservation(order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn cancel_returns_units_and_revives_depleted_lots() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    let lot = app.seed_lot(product, 5, days_ago(1), None).await;
    let order_id = Uuid::new_v4();

    app.state
        .services
        .reservations
        .reserve_inventory(order_id, vec![item(product, 5)], AllocationStrategy::Fifo)
        .await
        .unwrap();

    let lots = app.lots_for_product(product).await;
    assert_eq!(lots[0].status, LotStatus::Depleted.as_str());

    let released = app
        .state
        .services
        .reservations
        .cancel_reservation(order_id)
        .await
        .unwrap();
    assert_eq!(released, 5);

    let lots = app.lots_for_product(product).await;
    let lot_now = lots.iter().find(|l| l.id == lot.id).unwrap();
    assert_eq!(lot_now.status, LotStatus::Available.as_str());
    assert_eq!(lot_now.quantity_available, 5);
    assert_eq!(lot_now.quantity_reserved, 0);
    app.assert_lots_balanced(product).await;

    let err = app
        .state
        .services
        .reservations
        .cancel_reservation(order_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn cancel_preserves_allocations_made_while_the_hold_was_open() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    let lot = app.seed_lot(product, 10, days_ago(1), None).await;
    let order_id = Uuid::new_v4();

    app.state
        .services
        .reservations
        .reserve_inventory(order_id, vec![item(product, 4)], AllocationStrategy::Fifo)
        .await
        .unwrap();

    // Another caller draws from the same lot while the hold is open.
    app.state
        .services
        .allocation
        .allocate_inventory(product, 3, AllocationStrategy::Fifo)
        .await
        .unwrap();

    let released = app
        .state
        .services
        .reservations
        .cancel_reservation(order_id)
        .await
        .unwrap();
    assert_eq!(released, 4);

    // The release must return exactly the held units; the allocated ones
    // must not reappear as available.
    let lots = app.lots_for_product(product).await;
    let lot_now = lots.iter().find(|l| l.id == lot.id).unwrap();
    assert_eq!(lot_now.quantity_available, 7);
    assert_eq!(lot_now.quantity_reserved, 0);
    assert_eq!(lot_now.quantity_allocated, 3);
    app.assert_lots_balanced(product).await;
}

#[tokio::test]
async fn sweep_releases_expired_holds_and_is_idempotent() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot(product, 6, days_ago(1), None).await;
    let expired_svc = zero_ttl_service(&app);

    expired_svc
        .reserve_inventory(Uuid::new_v4(), vec![item(product, 4)], AllocationStrategy::Fifo)
        .await
        .unwrap();

    // Give the zero-TTL hold a moment to pass its deadline.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let first = expired_svc.release_expired_reservations().await.unwrap();
    assert_eq!(first.released_count, 1);
    assert_eq!(first.released_quantity, 4);

    let lots = app.lots_for_product(product).await;
    assert_eq!(lots[0].quantity_available, 6);
    assert_eq!(lots[0].quantity_reserved, 0);
    app.assert_lots_balanced(product).await;

    let second = expired_svc.release_expired_reservations().await.unwrap();
    assert_eq!(second.released_count, 0);
    assert_eq!(second.released_quantity, 0);
}

#[tokio::test]
async fn sweep_skips_fulfilled_and_live_holds() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot(product, 10, days_ago(1), None).await;
    let expired_svc = zero_ttl_service(&app);

    // An expired-but-fulfilled order and a live 30-minute hold.
    let fulfilled_order = Uuid::new_v4();
    expired_svc
        .reserve_inventory(
            fulfilled_order,
            vec![item(product, 3)],
            AllocationStrategy::Fifo,
        )
        .await
        .unwrap();
    expired_svc.fulfill_reservation(fulfilled_order).await.unwrap();

    app.state
        .services
        .reservations
        .reserve_inventory(Uuid::new_v4(), vec![item(product, 2)], AllocationStrategy::Fifo)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let result = expired_svc.release_expired_reservations().await.unwrap();
    assert_eq!(result.released_count, 0);

    let lots = app.lots_for_product(product).await;
    assert_eq!(lots[0].quantity_reserved, 5);
    assert_eq!(lots[0].quantity_available, 5);
}

#[tokio::test]
async fn empty_or_invalid_reservation_requests_are_rejected() {
    let app = TestApp::new().await;
    let svc = &app.state.services.reservations;

    assert_matches!(
        svc.reserve_inventory(Uuid::new_v4(), vec![], AllocationStrategy::Fifo)
            .await
            .unwrap_err(),
        ServiceError::ValidationError(_)
    );
    assert_matches!(
        svc.reserve_inventory(
            Uuid::new_v4(),
            vec![item(Uuid::new_v4(), -1)],
            AllocationStrategy::Fifo
        )
        .await
        .unwrap_err(),
        ServiceError::ValidationError(_)
    );
}
