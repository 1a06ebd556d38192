use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    AppState,
    api::models::predictions::{BatchPredictionResponse, PredictionOutput, PredictionRequest, PredictionResponse},
    auth::gate::Authenticated,
    errors::{Error, Result},
    metrics,
};

#[utoipa::path(
    post,
    path = "/predict",
    tag = "predictions",
    summary = "Predict assessment scores",
    description = "Score a single student, or a batch of 1 to 200 students sent as `{\"students\": [...]}`. \
                   Batch predictions are returned in request order.",
    request_body = PredictionRequest,
    responses(
        (status = 200, description = "Predicted scores", body = PredictionOutput),
        (status = 400, description = "Bad request - missing or invalid fields, or batch size out of bounds"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("BearerAuth" = [], "ApiKey" = [])
    )
)]
#[instrument(skip_all)]
pub async fn predict(
    Authenticated(claims): Authenticated,
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionOutput>> {
    let Json(body) = body.map_err(|rejection| Error::BadRequest {
        message: rejection.body_text(),
    })?;

    let request = PredictionRequest::from_value(body, state.config.limits.max_batch_size)?;
    debug!(subject = %claims.sub, "Prediction request accepted");

    let output = match request {
        PredictionRequest::Single(record) => {
            let score = state.engine.score(&record).await?;
            metrics::record_predictions("single", 1);
            PredictionOutput::Single(PredictionResponse::from_score(score))
        }
        PredictionRequest::Batch(batch) => {
            debug!(batch_size = batch.students.len(), "Scoring batch");
            let scores = state.engine.score_batch(&batch.students).await?;
            metrics::record_predictions("batch", scores.len());
            PredictionOutput::Batch(BatchPredictionResponse::from_scores(&scores))
        }
    };

    Ok(Json(output))
}

#[cfg(test)]
mod tests {
    use crate::cache::memory::MemoryStore;
    use crate::test_utils::{
        CountingModel, FailingModel, FailingStore, TEST_API_KEY, add_auth_headers, create_test_config, create_test_server,
        create_test_server_with_config,
    };
    use axum::{body::Bytes, http::StatusCode};
    use axum_test::TestServer;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn student(engagement_time: u32) -> Value {
        json!({
            "comprehension": 0.8,
            "attention": 0.6,
            "focus": 0.7,
            "retention": 0.9,
            "engagement_time": engagement_time,
        })
    }

    fn batch(n: u32) -> Value {
        json!({ "students": (0..n).map(student).collect::<Vec<_>>() })
    }

    async fn post(app: &TestServer, body: &Value) -> axum_test::TestResponse {
        let headers = add_auth_headers(&create_test_config());
        app.post("/predict")
            .add_header(&headers[0].0, &headers[0].1)
            .add_header(&headers[1].0, &headers[1].1)
            .json(body)
            .await
    }

    #[test_log::test(tokio::test)]
    async fn test_single_prediction_is_rounded_and_cached() {
        let model = Arc::new(CountingModel::fixed(72.345));
        let app = create_test_server(model.clone(), Arc::new(MemoryStore::new(None, None)));

        let first = post(&app, &student(45)).await;
        first.assert_status(StatusCode::OK);
        first.assert_json(&json!({ "predicted_score": "72.35" }));

        let second = post(&app, &student(45)).await;
        second.assert_status(StatusCode::OK);
        second.assert_json(&json!({ "predicted_score": "72.35" }));

        assert_eq!(model.calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_batch_prediction_preserves_order() {
        let model = Arc::new(CountingModel::by_engagement());
        let app = create_test_server(model.clone(), Arc::new(MemoryStore::new(None, None)));

        let response = post(&app, &batch(4)).await;
        response.assert_status(StatusCode::OK);
        response.assert_json(&json!({
            "batch_size": 4,
            "predictions": [
                { "predicted_score": "0.00" },
                { "predicted_score": "1.00" },
                { "predicted_score": "2.00" },
                { "predicted_score": "3.00" },
            ],
        }));
        assert_eq!(model.calls(), 1);
        assert_eq!(model.last_batch_size(), Some(4));
    }

    #[test_log::test(tokio::test)]
    async fn test_batch_of_one_matches_single() {
        let app = create_test_server(Arc::new(CountingModel::by_engagement()), Arc::new(MemoryStore::new(None, None)));

        let single: Value = post(&app, &student(7)).await.json();
        let batch: Value = post(&app, &json!({ "students": [student(7)] })).await.json();

        assert_eq!(batch["batch_size"], 1);
        assert_eq!(batch["predictions"][0], single);
    }

    #[test_log::test(tokio::test)]
    async fn test_batch_size_bounds() {
        let model = Arc::new(CountingModel::by_engagement());
        let app = create_test_server(model.clone(), Arc::new(MemoryStore::new(None, None)));

        post(&app, &batch(0)).await.assert_status(StatusCode::BAD_REQUEST);

        let too_large = post(&app, &batch(201)).await;
        too_large.assert_status(StatusCode::BAD_REQUEST);
        assert!(too_large.text().contains("200"));
        assert_eq!(model.calls(), 0);

        post(&app, &batch(1)).await.assert_status(StatusCode::OK);

        let full = post(&app, &batch(200)).await;
        full.assert_status(StatusCode::OK);
        assert_eq!(full.json::<Value>()["batch_size"], 200);
    }

    #[test_log::test(tokio::test)]
    async fn test_configured_batch_limit() {
        let mut config = create_test_config();
        config.limits.max_batch_size = 3;
        let app = create_test_server_with_config(
            config,
            Arc::new(CountingModel::by_engagement()),
            Arc::new(MemoryStore::new(None, None)),
        );

        post(&app, &batch(3)).await.assert_status(StatusCode::OK);
        post(&app, &batch(4)).await.assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_field_never_reaches_model() {
        let model = Arc::new(CountingModel::fixed(50.0));
        let app = create_test_server(model.clone(), Arc::new(MemoryStore::new(None, None)));

        let mut body = student(45);
        body.as_object_mut().unwrap().remove("attention");

        let response = post(&app, &body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("attention"));
        assert_eq!(model.calls(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_invalid_element_rejects_whole_batch() {
        let model = Arc::new(CountingModel::by_engagement());
        let app = create_test_server(model.clone(), Arc::new(MemoryStore::new(None, None)));

        let mut bad = student(2);
        bad["focus"] = json!("high");

        post(&app, &json!({ "students": [student(1), bad] }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(model.calls(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_json_is_bad_request() {
        let app = create_test_server(Arc::new(CountingModel::fixed(1.0)), Arc::new(MemoryStore::new(None, None)));
        let headers = add_auth_headers(&create_test_config());

        let response = app
            .post("/predict")
            .add_header(&headers[0].0, &headers[0].1)
            .add_header(&headers[1].0, &headers[1].1)
            .bytes(Bytes::from_static(b"{\"comprehension\": 0.8,"))
            .content_type("application/json")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn test_requires_token_and_api_key() {
        let model = Arc::new(CountingModel::fixed(1.0));
        let app = create_test_server(model.clone(), Arc::new(MemoryStore::new(None, None)));
        let headers = add_auth_headers(&create_test_config());

        // No credentials at all
        app.post("/predict")
            .json(&student(1))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // Token only
        app.post("/predict")
            .add_header(&headers[0].0, &headers[0].1)
            .json(&student(1))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // API key only
        app.post("/predict")
            .add_header(&headers[1].0, &headers[1].1)
            .json(&student(1))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // Wrong API key
        let wrong = app
            .post("/predict")
            .add_header(&headers[0].0, &headers[0].1)
            .add_header("x-api-key", "not-the-key")
            .json(&student(1))
            .await;
        wrong.assert_status(StatusCode::UNAUTHORIZED);
        wrong.assert_text("Unauthorized");

        assert_eq!(model.calls(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_expired_token_rejected() {
        use crate::auth::session::Claims;
        use jsonwebtoken::{EncodingKey, Header, encode};

        let config = create_test_config();
        let app = create_test_server(Arc::new(CountingModel::fixed(1.0)), Arc::new(MemoryStore::new(None, None)));

        let now = chrono::Utc::now();
        let claims = Claims {
            sub: "grader".to_string(),
            exp: (now - chrono::Duration::seconds(3600)).timestamp(),
            iat: (now - chrono::Duration::seconds(7200)).timestamp(),
        };
        let key = EncodingKey::from_secret(config.secret_key.as_ref().unwrap().as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let response = app
            .post("/predict")
            .add_header("authorization", format!("Bearer {token}"))
            .add_header("x-api-key", TEST_API_KEY)
            .json(&student(1))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_text("Unauthorized");
    }

    #[test_log::test(tokio::test)]
    async fn test_unauthenticated_invalid_body_is_unauthorized() {
        let app = create_test_server(Arc::new(CountingModel::fixed(1.0)), Arc::new(MemoryStore::new(None, None)));

        app.post("/predict")
            .json(&json!({ "students": [] }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[test_log::test(tokio::test)]
    async fn test_model_failure_is_internal_error() {
        let app = create_test_server(Arc::new(FailingModel), Arc::new(MemoryStore::new(None, None)));

        let response = post(&app, &student(1)).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_text("Prediction failed");

        post(&app, &batch(3)).await.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test_log::test(tokio::test)]
    async fn test_cache_outage_still_serves_predictions() {
        let model = Arc::new(CountingModel::fixed(61.0));
        let app = create_test_server(model.clone(), Arc::new(FailingStore));

        post(&app, &student(1)).await.assert_json(&json!({ "predicted_score": "61.00" }));
        post(&app, &student(1)).await.assert_json(&json!({ "predicted_score": "61.00" }));

        assert_eq!(model.calls(), 2);
    }
}
