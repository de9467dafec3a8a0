mod common;

use assert_matches::assert_matches;
use common::{days_ago, days_ahead, TestApp};
use lotledger_api::entities::inventory_lot::LotStatus;
use lotledger_api::errors::ServiceError;
use lotledger_api::services::allocation::AllocationStrategy;
use uuid::Uuid;

#[tokio::test]
async fn fifo_consumes_oldest_lots_first() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    let oldest = app.seed_lot(product, 5, days_ago(3), None).await;
    let middle = app.seed_lot(product, 5, days_ago(2), None).await;
    let newest = app.seed_lot(product, 5, days_ago(1), None).await;

    let draws = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 7, AllocationStrategy::Fifo)
        .await
        .unwrap();

    assert_eq!(draws.len(), 2);
    assert_eq!((draws[0].lot_id, draws[0].quantity), (oldest.id, 5));
    assert_eq!((draws[1].lot_id, draws[1].quantity), (middle.id, 2));

    let lots = app.lots_for_product(product).await;
    let oldest_now = lots.iter().find(|l| l.id == oldest.id).unwrap();
    assert_eq!(oldest_now.status, LotStatus::Depleted.as_str());
    assert_eq!(oldest_now.quantity_available, 0);
    assert_eq!(oldest_now.quantity_allocated, 5);
    let newest_now = lots.iter().find(|l| l.id == newest.id).unwrap();
    assert_eq!(newest_now.quantity_available, 5);

    app.assert_lots_balanced(product).await;
}

#[tokio::test]
async fn lifo_consumes_newest_lots_first() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    let oldest = app.seed_lot(product, 5, days_ago(3), None).await;
    let newest = app.seed_lot(product, 5, days_ago(1), None).await;

    let draws = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 6, AllocationStrategy::Lifo)
        .await
        .unwrap();

    assert_eq!((draws[0].lot_id, draws[0].quantity), (newest.id, 5));
    assert_eq!((draws[1].lot_id, draws[1].quantity), (oldest.id, 1));
    app.assert_lots_balanced(product).await;
}

#[tokio::test]
async fn fefo_orders_by_expiry_and_excludes_undated_lots() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    // Oldest received, but no expiry date: never a FEFO candidate.
    let undated = app.seed_lot(product, 10, days_ago(10), None).await;
    let later_expiry = app
        .seed_lot(product, 5, days_ago(2), Some(days_ahead(30)))
        .await;
    let soonest_expiry = app
        .seed_lot(product, 5, days_ago(1), Some(days_ahead(5)))
        .await;

    let draws = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 7, AllocationStrategy::Fefo)
        .await
        .unwrap();

    assert_eq!((draws[0].lot_id, draws[0].quantity), (soonest_expiry.id, 5));
    assert_eq!((draws[1].lot_id, draws[1].quantity), (later_expiry.id, 2));

    // Only 10 dated units exist; the undated lot cannot make up the rest.
    let err = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 4, AllocationStrategy::Fefo)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientInventory {
            needed: 4,
            allocated: 3
        }
    );

    let lots = app.lots_for_product(product).await;
    let undated_now = lots.iter().find(|l| l.id == undated.id).unwrap();
    assert_eq!(undated_now.quantity_available, 10);
    app.assert_lots_balanced(product).await;
}

#[tokio::test]
async fn lapsed_expiry_lots_are_never_drawn() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    // Oldest received, but past its expiry date: not consumable stock.
    let lapsed = app
        .seed_lot(product, 5, days_ago(10), Some(days_ahead(-3)))
        .await;
    let fresh = app
        .seed_lot(product, 5, days_ago(1), Some(days_ahead(20)))
        .await;

    let draws = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 5, AllocationStrategy::Fifo)
        .await
        .unwrap();
    assert_eq!((draws[0].lot_id, draws[0].quantity), (fresh.id, 5));

    // Only the lapsed lot has stock left; it cannot cover another unit.
    let err = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 1, AllocationStrategy::Lifo)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientInventory {
            needed: 1,
            allocated: 0
        }
    );

    let lots = app.lots_for_product(product).await;
    let lapsed_now = lots.iter().find(|l| l.id == lapsed.id).unwrap();
    assert_eq!(lapsed_now.quantity_available, 5);
    app.assert_lots_balanced(product).await;
}

#[tokio::test]
async fn shortfall_writes_nothing() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot(product, 4, days_ago(2), None).await;
    app.seed_lot(product, 3, days_ago(1), None).await;

    let err = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 10, AllocationStrategy::Fifo)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientInventory {
            needed: 10,
            allocated: 7
        }
    );

    for lot in app.lots_for_product(product).await {
        assert_eq!(lot.quantity_allocated, 0);
        assert_eq!(lot.quantity_available, lot.quantity_received);
        assert_eq!(lot.status, LotStatus::Available.as_str());
    }
}

#[tokio::test]
async fn allocation_ignores_quarantined_and_depleted_lots() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot(product, 5, days_ago(1), None).await;

    // Drain the lot, then ask again.
    app.state
        .services
        .allocation
        .allocate_inventory(product, 5, AllocationStrategy::Fifo)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .allocation
        .allocate_inventory(product, 1, AllocationStrategy::Fifo)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientInventory {
            needed: 1,
            allocated: 0
        }
    );
}

#[tokio::test]
async fn non_positive_quantity_is_rejected() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .allocation
        .allocate_inventory(Uuid::new_v4(), 0, AllocationStrategy::Fifo)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
