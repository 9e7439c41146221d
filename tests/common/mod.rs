// Not every test binary uses every helper here.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use sea_orm::{ConnectOptions, Database};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use pawhaven_api::{
    auth::{self, ROLE_ADMIN, ROLE_CUSTOMER},
    config::{AppConfig, StripeConfig},
    db,
    errors::ServiceError,
    events::EventSender,
    handlers::AppServices,
    payments::{
        webhook, CheckoutSession, CreateSessionRequest, PaymentGateway, ProductPrice,
    },
    AppState,
};

const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
const WEBHOOK_SECRET: &str = "whsec_integration_test_secret";

/// In-process payment provider double. Records every session request so
/// tests can assert on the metadata and line items the service sent.
#[derive(Default)]
pub struct FakeGateway {
    prices: Mutex<HashMap<String, ProductPrice>>,
    sessions: Mutex<Vec<CreateSessionRequest>>,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn set_default_price(&self, product_id: &str, price_id: &str, unit_amount: i64) {
        self.prices.lock().unwrap().insert(
            product_id.to_string(),
            ProductPrice {
                price_id: price_id.to_string(),
                unit_amount,
                currency: "aed".to_string(),
            },
        );
    }

    pub fn sessions(&self) -> Vec<CreateSessionRequest> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn last_session(&self) -> CreateSessionRequest {
        self.sessions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no checkout session was created")
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().push(request);
        Ok(CheckoutSession {
            id: format!("cs_test_{n}"),
            url: format!("https://pay.test/session/cs_test_{n}"),
        })
    }

    async fn default_price(&self, product_id: &str) -> Result<Option<ProductPrice>, ServiceError> {
        Ok(self.prices.lock().unwrap().get(product_id).cloned())
    }
}

/// Test harness: the full router over a single-connection in-memory SQLite
/// database and a [`FakeGateway`] in place of the real payment provider.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub customer_id: Uuid,
    customer_token: String,
    admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        // One pooled connection so every query sees the same in-memory db.
        options
            .max_connections(1)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(5))
            .sqlx_logging(false);
        let pool = Database::connect(options)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let cfg = AppConfig::new(
            "sqlite::memory:",
            JWT_SECRET,
            "127.0.0.1",
            0,
            "test",
            StripeConfig {
                secret_key: "sk_test_fake".to_string(),
                webhook_secret: WEBHOOK_SECRET.to_string(),
                webhook_tolerance_secs: 300,
                api_base: "http://localhost:0".to_string(),
                success_url: "https://shop.test/checkout/success".to_string(),
                cancel_url: "https://shop.test/checkout/cancel".to_string(),
            },
        );

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(pawhaven_api::events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::default());
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            gateway.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", pawhaven_api::api_v1_routes())
            .with_state(state.clone());

        let customer_id = Uuid::new_v4();
        let customer_token = auth::issue_token(
            JWT_SECRET,
            customer_id,
            "shopper@example.com",
            Some("Meera"),
            ROLE_CUSTOMER,
            chrono::Duration::hours(1),
        )
        .expect("issue customer token");
        let admin_token = auth::issue_token(
            JWT_SECRET,
            Uuid::new_v4(),
            "ops@pawhaven.test",
            None,
            ROLE_ADMIN,
            chrono::Duration::hours(1),
        )
        .expect("issue admin token");

        Self {
            router,
            state,
            gateway,
            customer_id,
            customer_token,
            admin_token,
            _event_task: event_task,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn customer_token(&self) -> &str {
        &self.customer_token
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Issues a token for a second, unrelated customer.
    pub fn token_for(&self, user_id: Uuid, email: &str) -> String {
        auth::issue_token(
            JWT_SECRET,
            user_id,
            email,
            None,
            ROLE_CUSTOMER,
            chrono::Duration::hours(1),
        )
        .expect("issue token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {tok}"));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn authed(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.customer_token()))
            .await
    }

    /// Delivers a correctly signed webhook payload.
    pub async fn post_webhook(&self, payload: &Value) -> axum::response::Response {
        self.post_webhook_raw(payload.to_string()).await
    }

    /// Delivers a correctly signed raw body, JSON or not.
    pub async fn post_webhook_raw(&self, body: String) -> axum::response::Response {
        let signature = webhook::signature_header(
            WEBHOOK_SECRET,
            Utc::now().timestamp(),
            body.as_bytes(),
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/payment")
            .header("content-type", "application/json")
            .header(webhook::SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .expect("build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook request")
    }

    /// Creates an order through the API and returns its id.
    pub async fn seed_order(&self, items: Value) -> Uuid {
        let response = self
            .authed(
                Method::POST,
                "/api/v1/orders",
                Some(json!({ "items": items })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "seeding order failed");
        let body = read_json(response).await;
        Uuid::parse_str(body["data"]["order_id"].as_str().expect("order id"))
            .expect("order id is a uuid")
    }

    /// Fetches an order as its owner through the list endpoint.
    pub async fn fetch_order(&self, order_id: Uuid) -> Value {
        let response = self
            .authed(Method::GET, "/api/v1/orders?per_page=100", None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        body["data"]["items"]
            .as_array()
            .expect("order list")
            .iter()
            .find(|o| o["id"].as_str() == Some(order_id.to_string().as_str()))
            .cloned()
            .unwrap_or_else(|| panic!("order {order_id} not in list"))
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// A `checkout.session.completed` payload naming an order.
pub fn completed_session_event(session_id: &str, order_ref: &str, intent: Option<&str>) -> Value {
    json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "payment_intent": intent,
            "metadata": { "order_id": order_ref, "user_id": "test" }
        }}
    })
}

pub fn expired_session_event(session_id: &str, order_ref: &str) -> Value {
    json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.expired",
        "data": { "object": {
            "id": session_id,
            "metadata": { "order_id": order_ref, "user_id": "test" }
        }}
    })
}

pub fn intent_event(event_type: &str, payment_intent_id: &str) -> Value {
    json!({
        "id": format!("evt_{payment_intent_id}"),
        "type": event_type,
        "data": { "object": { "id": payment_intent_id } }
    })
}

/// A typical physical-goods line in request form.
pub fn food_line(unit_price: i64, quantity: i32) -> Value {
    json!({
        "external_product_id": "prod_dog_food",
        "name": "Premium Dog Food 12kg",
        "unit_price": unit_price,
        "quantity": quantity
    })
}
