use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::allocation::{AllocationStrategy, LotDraw};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct AllocateInventoryRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[serde(default)]
    pub strategy: AllocationStrategy,
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub strategy: AllocationStrategy,
    pub draws: Vec<LotDraw>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    #[serde(default = "default_low_stock_threshold")]
    pub threshold: i32,
}

fn default_low_stock_threshold() -> i32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct ReorderQuery {
    pub lead_time_days: Option<u32>,
    pub safety_stock_days: Option<u32>,
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/allocate", post(allocate_inventory))
        .route("/low-stock", get(low_stock_products))
        .route("/:product_id/summary", get(inventory_summary))
        .route("/:product_id/reorder-suggestion", get(reorder_suggestion))
}

async fn allocate_inventory(
    State(state): State<AppState>,
    Json(payload): Json<AllocateInventoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let draws = state
        .services
        .allocation
        .allocate_inventory(payload.product_id, payload.quantity, payload.strategy)
        .await?;

    Ok(Json(ApiResponse::success(AllocationResponse {
        product_id: payload.product_id,
        quantity: payload.quantity,
        strategy: payload.strategy,
        draws,
    })))
}

async fn inventory_summary(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state.services.inventory.get_inventory_summary(product_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn low_stock_products(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state
        .services
        .inventory
        .get_low_stock_products(query.threshold)
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

async fn reorder_suggestion(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<ReorderQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    // Velocity inputs are accepted but inert until demand history is wired in.
    debug!(
        lead_time_days = ?query.lead_time_days,
        safety_stock_days = ?query.safety_stock_days,
        "Reorder suggestion requested"
    );

    let suggestion = state
        .services
        .inventory
        .calculate_reorder_quantity(product_id)
        .await?;
    Ok(Json(ApiResponse::success(suggestion)))
}
