use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::purchase_order::{self, PurchaseOrderStatus};
use crate::entities::purchase_order_item;
use crate::errors::ServiceError;
use crate::services::purchase_orders::{
    CreatePurchaseOrderInput, OverheadCosts, PurchaseOrderLineInput,
};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Deserialize, Serialize)]
pub struct PurchaseOrderLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_cost_cents: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Uuid,
    #[validate(length(min = 1, message = "at least one line item is required"))]
    pub items: Vec<PurchaseOrderLineRequest>,
    #[serde(default)]
    pub shipping_cost_cents: i64,
    #[serde(default)]
    pub customs_duty_cents: i64,
    #[serde(default)]
    pub other_fees_cents: i64,
    pub notes: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ListPurchaseOrdersQuery {
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ListPurchaseOrdersQuery {
    fn paging(&self) -> ListQuery {
        ListQuery {
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(20),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PurchaseOrderWithItems {
    #[serde(flatten)]
    pub order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
}

pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_purchase_order).get(list_purchase_orders))
        .route("/:id", get(get_purchase_order))
        .route("/:id/submit", post(submit_purchase_order))
        .route("/:id/confirm", post(confirm_purchase_order))
        .route("/:id/ship", post(ship_purchase_order))
        .route("/:id/cancel", post(cancel_purchase_order))
}

async fn create_purchase_order(
    State(state): State<AppState>,
    Json(payload): Json<CreatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let input = CreatePurchaseOrderInput {
        supplier_id: payload.supplier_id,
        items: payload
            .items
            .into_iter()
            .map(|line| PurchaseOrderLineInput {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_cost_cents: line.unit_cost_cents,
            })
            .collect(),
        overhead: OverheadCosts {
            shipping_cost_cents: payload.shipping_cost_cents,
            customs_duty_cents: payload.customs_duty_cents,
            other_fees_cents: payload.other_fees_cents,
        },
        notes: payload.notes,
        expected_delivery_date: payload.expected_delivery_date,
    };

    let (order, items) = state.services.purchase_orders.create_purchase_order(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(PurchaseOrderWithItems { order, items })),
    ))
}

async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state.services.purchase_orders.get_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(PurchaseOrderWithItems { order, items })))
}

async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(query): Query<ListPurchaseOrdersQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let ListQuery { page, limit } = query.paging();
    let (orders, total) = match (&query.status, query.supplier_id) {
        (Some(status), _) => {
            let status = PurchaseOrderStatus::from_str(status).ok_or_else(|| {
                ServiceError::ValidationError(format!("Unknown status filter '{}'", status))
            })?;
            state
                .services
                .purchase_orders
                .list_by_status(status, page, limit)
                .await?
        }
        (None, Some(supplier_id)) => {
            state
                .services
                .purchase_orders
                .list_by_supplier(supplier_id, page, limit)
                .await?
        }
        (None, None) => {
            return Err(ServiceError::ValidationError(
                "Provide a status or supplier_id filter".to_string(),
            ));
        }
    };

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders, total, page, limit,
    ))))
}

async fn submit_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.submit_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn confirm_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.confirm_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn ship_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.mark_shipped(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn cancel_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.cancel_purchase_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}
