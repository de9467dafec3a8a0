#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use lotledger_api::{
    config::AppConfig,
    db,
    entities::inventory_lot::{self, LotStatus},
    entities::product,
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper harness spinning up the full application over a file-backed
/// SQLite database. Pool size 1 keeps sqlite writer contention out of the
/// picture; each TestApp gets its own database file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = TempDir::new().expect("failed to create temp dir");
        let db_file = db_dir.path().join("lotledger_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", lotledger_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Issue a JSON request against the in-process router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed a catalog product row.
    pub async fn seed_product(
        &self,
        sku: &str,
        stock_quantity: i32,
        reorder_point: Option<i32>,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Test Product {}", sku)),
            stock_quantity: Set(stock_quantity),
            reorder_point: Set(reorder_point),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product")
    }

    /// Seed an AVAILABLE lot directly, bypassing receiving.
    pub async fn seed_lot(
        &self,
        product_id: Uuid,
        quantity: i32,
        received_date: DateTime<Utc>,
        expiry_date: Option<NaiveDate>,
    ) -> inventory_lot::Model {
        self.seed_lot_priced(product_id, quantity, received_date, expiry_date, 100, 100)
            .await
    }

    /// Seed an AVAILABLE lot with explicit unit costs.
    pub async fn seed_lot_priced(
        &self,
        product_id: Uuid,
        quantity: i32,
        received_date: DateTime<Utc>,
        expiry_date: Option<NaiveDate>,
        cost_per_unit_cents: i64,
        landed_cost_per_unit_cents: i64,
    ) -> inventory_lot::Model {
        let now = Utc::now();
        inventory_lot::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            supplier_id: Set(None),
            purchase_order_id: Set(None),
            lot_number: Set(format!("LOT-SEED-{}", &Uuid::new_v4().to_string()[..8])),
            quantity_received: Set(quantity),
            quantity_available: Set(quantity),
            quantity_reserved: Set(0),
            quantity_allocated: Set(0),
            cost_per_unit_cents: Set(cost_per_unit_cents),
            landed_cost_per_unit_cents: Set(landed_cost_per_unit_cents),
            received_date: Set(received_date),
            expiry_date: Set(expiry_date),
            status: Set(LotStatus::Available.as_str().to_string()),
            created_at: Set(received_date),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed lot")
    }

    /// Fetch every lot for a product, oldest received first.
    pub async fn lots_for_product(&self, product_id: Uuid) -> Vec<inventory_lot::Model> {
        inventory_lot::Entity::find()
            .filter(inventory_lot::Column::ProductId.eq(product_id))
            .all(&*self.state.db)
            .await
            .expect("failed to load lots")
    }

    /// Assert the conservation invariant over every lot of a product.
    pub async fn assert_lots_balanced(&self, product_id: Uuid) {
        for lot in self.lots_for_product(product_id).await {
            assert!(
                lot.quantities_balance(),
                "lot {} out of balance: available={} reserved={} allocated={} received={}",
                lot.lot_number,
                lot.quantity_available,
                lot.quantity_reserved,
                lot.quantity_allocated,
                lot.quantity_received
            );
        }
    }
}

/// A timestamp `days` in the past, handy for FIFO/LIFO ordering.
pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// A calendar date `days` in the future, handy for expiry dates.
pub fn days_ahead(days: i64) -> NaiveDate {
    (Utc::now() + Duration::days(days)).date_naive()
}

/// Decode a JSON response body.
pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body was not valid json")
}
