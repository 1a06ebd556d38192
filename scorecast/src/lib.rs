//! # scorecast: Student Assessment Score Prediction
//!
//! `scorecast` serves a pretrained regression model that predicts a student's assessment score
//! from five numeric features: `comprehension`, `attention`, `focus`, `retention` and
//! `engagement_time`. Callers can score one student or a batch of up to 200 on the same
//! endpoint.
//!
//! ## Request Flow
//!
//! A `POST /predict` request passes through three stages:
//!
//! 1. **Auth gate** ([`auth::gate`]): the caller must present a valid, unexpired JWT *and* a
//!    known static API key. Either failing yields 401 before the body is read.
//! 2. **Validation** ([`api::models::predictions`]): the body is resolved into a single record or
//!    a batch by its shape, every field is type-checked and batch bounds are enforced. Invalid
//!    input yields 400 and never reaches the model.
//! 3. **Scoring** ([`scoring::ScoringEngine`]): each record is looked up in the prediction cache
//!    under a key scoped to the loaded model. Misses are scored by the model (a batch in exactly
//!    one inference call) and written back.
//!
//! Scores are returned as strings rounded to two decimals.
//!
//! ## Collaborators
//!
//! - The model is any [`model::ScoringModel`]; [`model::LinearPipeline`] loads the artifact
//!   produced by the offline training job.
//! - The cache is any [`cache::CacheStore`] behind [`cache::PredictionCache`], which bounds every
//!   call with a timeout and turns failures into misses. Memory (moka) and Redis stores ship.
//!
//! ## Configuration
//!
//! See [`config`]: YAML file plus `SCORECAST_` environment overrides.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod openapi;
pub mod scoring;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use anyhow::Context;
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;

pub use config::Config;

use crate::{
    cache::PredictionCache,
    model::{LinearPipeline, ScoringModel},
    openapi::ApiDoc,
    scoring::ScoringEngine,
};

/// Shared state handed to every handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .engine(Arc::new(engine))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<ScoringEngine>,
}

/// Build the application router.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let mut router = Router::new()
        .route("/predict", post(api::handlers::predictions::predict))
        .route("/auth/token", post(api::handlers::auth::issue_token))
        .route("/healthz", get(api::handlers::health::healthz))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    if state.config.enable_metrics {
        // Installs the global recorder that `metrics` counters report to
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// A configured service: model loaded, cache connected (lazily for Redis), router built.
///
/// 1. **Create**: [`Application::new`] loads the model artifact and opens the cache store
/// 2. **Serve**: [`Application::serve`] binds the configured address and handles requests until
///    the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting scorecast with configuration: {:#?}", config);

        let model = LinearPipeline::from_path(&config.model.path)
            .with_context(|| format!("loading model artifact {}", config.model.path.display()))?;

        let store = cache::create_store(&config.cache).context("creating prediction cache")?;
        info!(
            backend = store.backend(),
            timeout = ?config.cache.timeout,
            "Prediction cache ready"
        );

        let cache = PredictionCache::new(store, config.cache.timeout);
        Self::from_parts(config, Arc::new(model), cache)
    }

    /// Assemble an application from an already-built model and cache
    pub fn from_parts(config: Config, model: Arc<dyn ScoringModel>, cache: PredictionCache) -> anyhow::Result<Self> {
        let state = AppState::builder()
            .config(config.clone())
            .engine(Arc::new(ScoringEngine::new(model, cache)))
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "scorecast listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
