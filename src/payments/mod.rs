//! Payment-provider integration.
//!
//! [`PaymentGateway`] is the seam between the order pipeline and the hosted
//! payment provider: creating checkout sessions and resolving product
//! default prices. [`StripeGateway`] is the production implementation over
//! Stripe's form-encoded REST API; tests substitute a mock.
//!
//! Webhook verification and event parsing live in [`webhook`].

pub mod webhook;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use crate::errors::ServiceError;

/// Metadata value standing in for an order id on single-product sessions,
/// where no order exists. Reconciler handlers skip order mutation when they
/// see it.
pub const SENTINEL_ORDER_MARKER: &str = "standalone";

/// One (price, quantity) pair on a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLine {
    pub price_id: String,
    pub quantity: i64,
}

/// Request to create a hosted checkout session. `order_ref` and `user_id`
/// become the session metadata, the only join key the reconciler has; it is
/// set exactly once here and never altered.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub lines: Vec<SessionLine>,
    pub order_ref: String,
    pub user_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect target for the shopper.
    pub url: String,
}

/// A provider price attached to a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPrice {
    pub price_id: String,
    /// Minor currency units.
    pub unit_amount: i64,
    pub currency: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment-mode checkout session covering all lines.
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;

    /// Fetches a product's default price, or `None` when the product has no
    /// default price configured.
    async fn default_price(&self, product_id: &str) -> Result<Option<ProductPrice>, ServiceError>;
}

/// Stripe REST client. All calls are bearer-authenticated form posts/gets
/// against `/v1`.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            api_base: api_base.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductPayload {
    #[serde(default)]
    default_price: Option<PricePayload>,
}

#[derive(Debug, Deserialize)]
struct PricePayload {
    id: String,
    #[serde(default)]
    unit_amount: Option<i64>,
    currency: String,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(order_ref = %request.order_ref, lines = request.lines.len()))]
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("metadata[order_id]".into(), request.order_ref.clone()),
            ("metadata[user_id]".into(), request.user_id.clone()),
        ];
        for (i, line) in request.lines.iter().enumerate() {
            params.push((format!("line_items[{i}][price]"), line.price_id.clone()));
            params.push((
                format!("line_items[{i}][quantity]"),
                line.quantity.to_string(),
            ));
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("session create failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentProvider(format!(
                "session create returned {status}: {body}"
            )));
        }

        let payload: SessionPayload = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("malformed session body: {e}")))?;

        let url = payload.url.ok_or_else(|| {
            ServiceError::PaymentProvider("session has no redirect url".to_string())
        })?;

        Ok(CheckoutSession {
            id: payload.id,
            url,
        })
    }

    #[instrument(skip(self))]
    async fn default_price(&self, product_id: &str) -> Result<Option<ProductPrice>, ServiceError> {
        let response = self
            .http
            .get(format!("{}/v1/products/{}", self.api_base, product_id))
            .query(&[("expand[]", "default_price")])
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("product fetch failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentProvider(format!(
                "product fetch returned {status}: {body}"
            )));
        }

        let payload: ProductPayload = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("malformed product body: {e}")))?;

        Ok(payload.default_price.and_then(|price| {
            price.unit_amount.map(|unit_amount| ProductPrice {
                price_id: price.id,
                unit_amount,
                currency: price.currency,
            })
        }))
    }
}
