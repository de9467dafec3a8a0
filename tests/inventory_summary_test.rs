mod common;

use assert_matches::assert_matches;
use common::{days_ago, days_ahead, TestApp};
use lotledger_api::errors::ServiceError;
use lotledger_api::services::allocation::AllocationStrategy;
use uuid::Uuid;

#[tokio::test]
async fn summary_totals_and_weighted_averages() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot_priced(product, 10, days_ago(3), None, 100, 120)
        .await;
    app.seed_lot_priced(product, 30, days_ago(1), None, 200, 220)
        .await;

    let summary = app
        .state
        .services
        .inventory
        .get_inventory_summary(product)
        .await
        .unwrap();

    assert_eq!(summary.total_available, 40);
    assert_eq!(summary.total_reserved, 0);
    assert_eq!(summary.lot_count, 2);
    // (10*100 + 30*200) / 40 and (10*120 + 30*220) / 40.
    assert_eq!(summary.average_cost_per_unit_cents, Some(175));
    assert_eq!(summary.average_landed_cost_per_unit_cents, Some(195));
    assert_eq!(summary.lots.len(), 2);
}

#[tokio::test]
async fn summary_counts_lots_expiring_within_horizon() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot(product, 5, days_ago(2), Some(days_ahead(10)))
        .await;
    app.seed_lot(product, 5, days_ago(2), Some(days_ahead(60)))
        .await;
    app.seed_lot(product, 5, days_ago(2), None).await;

    let summary = app
        .state
        .services
        .inventory
        .get_inventory_summary(product)
        .await
        .unwrap();

    assert_eq!(summary.lot_count, 3);
    assert_eq!(summary.expiring_within_30_days, 1);
}

#[tokio::test]
async fn summary_averages_follow_remaining_availability() {
    let app = TestApp::new().await;
    let product = Uuid::new_v4();
    app.seed_lot_priced(product, 5, days_ago(2), None, 100, 100)
        .await;
    app.seed_lot_priced(product, 5, days_ago(1), None, 300, 300)
        .await;

    // Drain the cheap lot; the average should follow what's left.
    app.state
        .services
        .allocation
        .allocate_inventory(product, 5, AllocationStrategy::Fifo)
        .await
        .unwrap();

    let summary = app
        .state
        .services
        .inventory
        .get_inventory_summary(product)
        .await
        .unwrap();
    assert_eq!(summary.total_available, 5);
    assert_eq!(summary.total_allocated, 5);
    assert_eq!(summary.average_cost_per_unit_cents, Some(300));
}

#[tokio::test]
async fn summary_with_no_stock_has_no_averages() {
    let app = TestApp::new().await;
    let summary = app
        .state
        .services
        .inventory
        .get_inventory_summary(Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(summary.lot_count, 0);
    assert_eq!(summary.average_cost_per_unit_cents, None);
}

#[tokio::test]
async fn low_stock_filters_by_threshold() {
    let app = TestApp::new().await;
    let low = app.seed_product("SKU-LOW", 2, Some(20)).await;
    app.seed_product("SKU-HEALTHY", 50, Some(20)).await;

    let products = app
        .state
        .services
        .inventory
        .get_low_stock_products(10)
        .await
        .unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].product_id, low.id);
    assert_eq!(products[0].stock_quantity, 2);
}

#[tokio::test]
async fn reorder_suggestion_falls_back_to_reorder_point_shortfall() {
    let app = TestApp::new().await;
    let tracked = app.seed_product("SKU-REORDER", 10, Some(50)).await;
    let untracked = app.seed_product("SKU-NOPOINT", 10, None).await;

    let suggestion = app
        .state
        .services
        .inventory
        .calculate_reorder_quantity(tracked.id)
        .await
        .unwrap();
    assert_eq!(suggestion.suggested_quantity, 40);
    assert!(!suggestion.has_velocity_data);

    let suggestion = app
        .state
        .services
        .inventory
        .calculate_reorder_quantity(untracked.id)
        .await
        .unwrap();
    assert_eq!(suggestion.suggested_quantity, 0);

    let err = app
        .state
        .services
        .inventory
        .calculate_reorder_quantity(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
