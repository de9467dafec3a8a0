use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::receiving::ReceivedItemInput;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct StartReceivingRequest {
    pub purchase_order_id: Uuid,
    #[validate(length(max = 255))]
    pub received_by: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReceivedItemRequest {
    pub product_id: Uuid,
    pub quantity_received: i32,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteReceivingRequest {
    #[validate(length(min = 1, message = "at least one received item is required"))]
    pub items: Vec<ReceivedItemRequest>,
    pub qc_passed: bool,
    pub qc_notes: Option<String>,
}

pub fn receiving_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_receiving))
        .route("/:id/complete", post(complete_receiving))
}

async fn start_receiving(
    State(state): State<AppState>,
    Json(payload): Json<StartReceivingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let workflow = state
        .services
        .receiving
        .start_receiving(payload.purchase_order_id, payload.received_by)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(workflow))))
}

async fn complete_receiving(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteReceivingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let items = payload
        .items
        .into_iter()
        .map(|item| ReceivedItemInput {
            product_id: item.product_id,
            quantity_received: item.quantity_received,
            expiry_date: item.expiry_date,
        })
        .collect();

    let receipt = state
        .services
        .receiving
        .complete_receiving(id, items, payload.qc_passed, payload.qc_notes)
        .await?;

    Ok(Json(ApiResponse::success(receipt)))
}
