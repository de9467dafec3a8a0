use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::allocation::AllocationStrategy;
use crate::services::reservations::ReserveItemInput;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Serialize)]
pub struct ReserveItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReserveInventoryRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "at least one product line is required"))]
    pub items: Vec<ReserveItemRequest>,
    #[serde(default)]
    pub strategy: AllocationStrategy,
}

#[derive(Debug, Serialize)]
pub struct FulfillResponse {
    pub order_id: Uuid,
    pub fulfilled_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub order_id: Uuid,
    pub released_quantity: i64,
}

pub fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(reserve_inventory))
        .route("/orders/:order_id", get(get_order_reservations))
        .route("/orders/:order_id/fulfill", post(fulfill_reservation))
        .route("/orders/:order_id/cancel", post(cancel_reservation))
        .route("/sweep", post(run_sweep))
}

async fn reserve_inventory(
    State(state): State<AppState>,
    Json(payload): Json<ReserveInventoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let items = payload
        .items
        .into_iter()
        .map(|item| ReserveItemInput {
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();

    let reservations = state
        .services
        .reservations
        .reserve_inventory(payload.order_id, items, payload.strategy)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(reservations))))
}

async fn get_order_reservations(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let reservations = state
        .services
        .reservations
        .get_reservations_for_order(order_id)
        .await?;
    Ok(Json(ApiResponse::success(reservations)))
}

async fn fulfill_reservation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let fulfilled_count = state.services.reservations.fulfill_reservation(order_id).await?;
    Ok(Json(ApiResponse::success(FulfillResponse {
        order_id,
        fulfilled_count,
    })))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let released_quantity = state.services.reservations.cancel_reservation(order_id).await?;
    Ok(Json(ApiResponse::success(CancelResponse {
        order_id,
        released_quantity,
    })))
}

async fn run_sweep(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .reservations
        .release_expired_reservations()
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
