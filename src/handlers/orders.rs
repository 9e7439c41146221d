use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::orders::{
        CreateOrderRequest, CreateOrderResponse, OrderResponse, UpdateOrderStatusRequest,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

/// Creates an order from a cart snapshot.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created in pending state"),
        (status = 400, description = "Empty cart or invalid line item", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiResult<CreateOrderResponse> {
    let response = state
        .services
        .orders
        .create_order(&user, payload, &state.config.currency)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Lists the caller's orders, newest first, items included.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "The caller's orders"),
        (status = 401, description = "Missing or invalid bearer token", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<PaginatedResponse<OrderResponse>> {
    // Normalized once here so the reported page/per_page always match the
    // slice that was actually fetched.
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);

    let (orders, total) = state
        .services
        .orders
        .list_for_user(user.id, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders, page, per_page, total,
    ))))
}

/// Administrative status override. Payment-driven transitions belong to the
/// webhook reconciler; this endpoint drives fulfillment and manual
/// cancellation.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order identifier")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 403, description = "Caller is not an administrator", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such order", body = crate::errors::ErrorResponse),
        (status = 409, description = "Illegal status transition", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    user.require_admin()?;
    let response = state.services.orders.set_status(id, payload).await?;
    Ok(Json(ApiResponse::success(response)))
}
