use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tavolo API",
        description = "Order pricing, checkout and payment-intent orchestration for the Tavolo food-delivery platform"
    ),
    paths(
        handlers::orders::create_order,
        handlers::orders::retry_payment,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::payments::create_setup_intent,
        handlers::payments::list_payment_methods,
        handlers::payments::detach_payment_method,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::OrderItemInput,
        crate::services::orders::DeliveryAddress,
        crate::services::orders::Coordinates,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderConfirmation,
        crate::services::orders::OrderLineResponse,
        crate::services::orders::OrderDetails,
        crate::services::orders::OrderListResponse,
        crate::handlers::payments::SetupIntentResponse,
        crate::handlers::payments::DetachResponse,
        crate::payments::PaymentMethodSummary,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Checkout and order history"),
        (name = "payments", description = "Saved payment methods"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
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

/// Swagger UI serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
