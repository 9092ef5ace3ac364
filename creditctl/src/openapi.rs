//! OpenAPI documentation configuration. Rendered at `/docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "creditctl",
        description = "Credit-metering control layer for AI video generation"
    ),
    paths(
        crate::api::handlers::generations::record_generation,
        crate::api::handlers::accounts::create_account,
        crate::api::handlers::accounts::get_account,
        crate::api::handlers::accounts::grant_topup,
        crate::api::handlers::accounts::get_usage,
        crate::api::handlers::samples::random_sample,
        crate::api::handlers::samples::create_sample,
    ),
    components(schemas(
        crate::ledger::Decision,
        crate::ledger::DecisionReason,
        crate::api::models::generations::GenerationCreate,
        crate::api::models::accounts::AccountCreate,
        crate::api::models::accounts::AccountResponse,
        crate::api::models::accounts::TopupGrant,
        crate::api::models::accounts::UsageSummaryResponse,
        crate::api::models::samples::SampleCreate,
        crate::api::models::samples::SampleResponse,
    )),
    modifiers(&ServiceKeyScheme),
    tags(
        (name = "generations", description = "The credit ledger gate"),
        (name = "accounts", description = "Account provisioning, balances and usage"),
        (name = "showcase", description = "Showcase samples"),
    ),
    servers((url = "/api/v1"))
)]
pub struct ApiDoc;

struct ServiceKeyScheme;

impl Modify for ServiceKeyScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "service_key",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
