//! OpenAPI documentation served at `/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Prediction requests need both a bearer token and an API key.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from `POST /auth/token`. Include it in the `Authorization` header:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "ApiKey".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "X-API-Key",
                    "Static API key. The header name is configurable through `auth.api_key_header`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "scorecast",
        description = "Student assessment score prediction service"
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::predictions::predict,
        api::handlers::auth::issue_token,
        api::handlers::health::healthz,
    ),
    components(
        schemas(
            crate::scoring::types::FeatureRecord,
            api::models::predictions::BatchRequest,
            api::models::predictions::PredictionRequest,
            api::models::predictions::PredictionResponse,
            api::models::predictions::BatchPredictionResponse,
            api::models::predictions::PredictionOutput,
            api::models::auth::TokenRequest,
            api::models::auth::TokenResponse,
        )
    ),
    tags(
        (name = "predictions", description = "Assessment score predictions"),
        (name = "authentication", description = "Access token issuance"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;
