use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pawhaven Commerce API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Order intake, hosted checkout brokering, payment webhook \
reconciliation and order queries for the Pawhaven pet-care storefront."
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::checkout::create_checkout_session,
        crate::handlers::webhooks::payment_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::services::orders::Address,
        crate::services::orders::OrderLineInput,
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::CreateOrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::services::orders::OrderResponse,
        crate::services::orders::UpdateOrderStatusRequest,
        crate::services::checkout::CheckoutLine,
        crate::services::checkout::CheckoutSessionResponse,
        crate::handlers::checkout::CheckoutSessionRequest,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Orders", description = "Order intake, queries and administrative overrides"),
        (name = "Checkout", description = "Hosted checkout session brokering"),
        (name = "Webhooks", description = "Payment provider callbacks")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI mounted at `/docs`, serving the OpenAPI document at
/// `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
