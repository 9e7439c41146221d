use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    services::checkout::{CheckoutLine, CheckoutSessionResponse},
    ApiResponse, ApiResult, AppState,
};

/// Checkout request. Order mode carries an order id plus its lines;
/// single-product mode carries just a provider product id and buys one unit
/// of it without creating an internal order.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CheckoutSessionRequest {
    Order {
        order_id: Uuid,
        items: Vec<CheckoutLine>,
    },
    SingleProduct {
        product_id: String,
    },
}

/// Brokers a hosted checkout session and returns the redirect URL.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/session",
    request_body = CheckoutSessionRequest,
    responses(
        (status = 200, description = "Hosted checkout session created"),
        (status = 400, description = "A line has no resolvable price", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found for this caller", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutSessionRequest>,
) -> ApiResult<CheckoutSessionResponse> {
    let response = match payload {
        CheckoutSessionRequest::Order { order_id, items } => {
            state
                .services
                .checkout
                .for_order(&user, order_id, &items)
                .await?
        }
        CheckoutSessionRequest::SingleProduct { product_id } => {
            state
                .services
                .checkout
                .single_product(&user, &product_id)
                .await?
        }
    };
    Ok(Json(ApiResponse::success(response)))
}
