use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    config::StripeConfig,
    errors::ServiceError,
    payments::{
        CreateSessionRequest, PaymentGateway, SessionLine, SENTINEL_ORDER_MARKER,
    },
    services::orders::OrderService,
};

/// One line to be priced on a checkout session. Lines with an explicit
/// external price id (service-tier bookings) use it directly; catalog lines
/// resolve the provider product's default price at brokering time.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutLine {
    #[validate(length(min = 1))]
    pub external_product_id: String,
    pub external_price_id: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSessionResponse {
    /// Redirect target for the externally hosted payment page.
    pub url: String,
    pub session_id: String,
    /// Absent in single-product mode, where no order exists.
    pub order_id: Option<Uuid>,
}

/// Brokers hosted checkout sessions with the payment provider.
///
/// The session metadata written here ({order_id, user_id}) is the only link
/// between the provider session and the internal order; the reconciler joins
/// on it. It is set exactly once, at session creation, and never altered.
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<OrderService>,
    stripe: StripeConfig,
}

impl CheckoutService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<OrderService>,
        stripe: StripeConfig,
    ) -> Self {
        Self {
            gateway,
            orders,
            stripe,
        }
    }

    /// Single-product mode: one ad-hoc purchase, quantity 1, no internal
    /// order. The sentinel marker takes the order id's place in metadata so
    /// the reconciler knows to leave orders alone.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn single_product(
        &self,
        user: &AuthUser,
        product_id: &str,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        if product_id.is_empty() {
            return Err(ServiceError::ValidationError(
                "product id is required".to_string(),
            ));
        }

        let price = self
            .gateway
            .default_price(product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "product {product_id} has no default price configured"
                ))
            })?;

        let session = self
            .gateway
            .create_checkout_session(CreateSessionRequest {
                lines: vec![SessionLine {
                    price_id: price.price_id,
                    quantity: 1,
                }],
                order_ref: SENTINEL_ORDER_MARKER.to_string(),
                user_id: user.id.to_string(),
                success_url: self.stripe.success_url.clone(),
                cancel_url: self.stripe.cancel_url.clone(),
            })
            .await?;

        info!(session_id = %session.id, "standalone checkout session created");
        Ok(CheckoutSessionResponse {
            url: session.url,
            session_id: session.id,
            order_id: None,
        })
    }

    /// Order mode: one session covering every line of an existing order.
    /// Every line must resolve to a price before the provider is asked for a
    /// session; an unpriced line fails the whole request up front.
    #[instrument(skip(self, user, lines), fields(user_id = %user.id, line_count = lines.len()))]
    pub async fn for_order(
        &self,
        user: &AuthUser,
        order_id: Uuid,
        lines: &[CheckoutLine],
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "checkout requires at least one line".to_string(),
            ));
        }
        for line in lines {
            line.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        // Existence and ownership check before any external call.
        self.orders.get_owned(order_id, user.id).await?;

        let mut resolved = Vec::with_capacity(lines.len());
        for line in lines {
            let price_id = match &line.external_price_id {
                Some(price_id) => price_id.clone(),
                None => self
                    .gateway
                    .default_price(&line.external_product_id)
                    .await?
                    .map(|price| price.price_id)
                    .ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "product {} has no resolvable price",
                            line.external_product_id
                        ))
                    })?,
            };
            resolved.push(SessionLine {
                price_id,
                quantity: i64::from(line.quantity),
            });
        }

        let session = self
            .gateway
            .create_checkout_session(CreateSessionRequest {
                lines: resolved,
                order_ref: order_id.to_string(),
                user_id: user.id.to_string(),
                success_url: self.stripe.success_url.clone(),
                cancel_url: self.stripe.cancel_url.clone(),
            })
            .await?;

        // Recorded after the provider call: a provider failure leaves the
        // order pending with no session id, safe to retry.
        self.orders
            .record_checkout_session(order_id, user.id, &session.id)
            .await?;

        info!(session_id = %session.id, "order checkout session created");
        Ok(CheckoutSessionResponse {
            url: session.url,
            session_id: session.id,
            order_id: Some(order_id),
        })
    }
}
