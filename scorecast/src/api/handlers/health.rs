/// Liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = String),
    )
)]
pub async fn healthz() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use crate::cache::NoopStore;
    use crate::test_utils::{CountingModel, create_test_server};
    use axum::http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_healthz_needs_no_credentials() {
        let app = create_test_server(Arc::new(CountingModel::fixed(1.0)), Arc::new(NoopStore));

        let response = app.get("/healthz").await;
        response.assert_status(StatusCode::OK);
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_openapi_document_lists_routes() {
        let app = create_test_server(Arc::new(CountingModel::fixed(1.0)), Arc::new(NoopStore));

        let response = app.get("/openapi.json").await;
        response.assert_status(StatusCode::OK);

        let doc: serde_json::Value = response.json();
        assert!(doc["paths"].get("/predict").is_some());
        assert!(doc["paths"].get("/auth/token").is_some());
        assert!(doc["components"]["securitySchemes"].get("ApiKey").is_some());
    }
}
