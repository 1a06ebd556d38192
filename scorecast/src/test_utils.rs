//! Test utilities for integration testing (available with `test-utils` feature).

use async_trait::async_trait;
use axum_test::TestServer;
use std::sync::{
    Arc, LazyLock, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use crate::{
    AppState,
    auth::{
        password::{Argon2Params, hash_password_with_params},
        session,
    },
    cache::{CacheError, CacheStore, PredictionCache},
    config::{AuthConfig, CacheConfig, Config, UserCredentials},
    model::{self, ModelError, ScoringModel},
    scoring::{ScoringEngine, types::FeatureRecord},
};

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_USERNAME: &str = "grader";
pub const TEST_PASSWORD: &str = "test-password";

// Hashed once with cheap parameters
static TEST_PASSWORD_HASH: LazyLock<String> = LazyLock::new(|| {
    let params = Argon2Params {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    hash_password_with_params(TEST_PASSWORD, params).expect("Failed to hash test password")
});

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        cache: CacheConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        },
        auth: AuthConfig {
            api_keys: vec![TEST_API_KEY.to_string()],
            users: vec![UserCredentials {
                username: TEST_USERNAME.to_string(),
                password_hash: TEST_PASSWORD_HASH.clone(),
            }],
            ..Default::default()
        },
        // The Prometheus recorder is process-global
        enable_metrics: false,
        ..Default::default()
    }
}

/// `Authorization` and API key headers accepted by a server built from `config`
pub fn add_auth_headers(config: &Config) -> Vec<(String, String)> {
    let token = session::create_token(TEST_USERNAME, config).expect("Failed to create test token");
    vec![
        ("authorization".to_string(), format!("Bearer {token}")),
        (config.auth.api_key_header.clone(), TEST_API_KEY.to_string()),
    ]
}

pub fn sample_record() -> FeatureRecord {
    FeatureRecord {
        comprehension: 0.8,
        attention: 0.6,
        focus: 0.7,
        retention: 0.9,
        engagement_time: 45,
    }
}

pub fn create_test_state(config: Config, model: Arc<dyn ScoringModel>, store: Arc<dyn CacheStore>) -> AppState {
    let cache = PredictionCache::new(store, config.cache.timeout);
    AppState::builder()
        .config(config)
        .engine(Arc::new(ScoringEngine::new(model, cache)))
        .build()
}

pub fn create_test_server(model: Arc<dyn ScoringModel>, store: Arc<dyn CacheStore>) -> TestServer {
    create_test_server_with_config(create_test_config(), model, store)
}

pub fn create_test_server_with_config(config: Config, model: Arc<dyn ScoringModel>, store: Arc<dyn CacheStore>) -> TestServer {
    let state = create_test_state(config, model, store);
    let router = crate::build_router(&state).expect("Failed to build router");
    TestServer::new(router.into_make_service()).expect("Failed to create test server")
}

enum Behaviour {
    Fixed(f64),
    ByEngagement,
    Truncating(f64),
}

/// Model double that records how often and with how many rows it was invoked.
pub struct CountingModel {
    behaviour: Behaviour,
    calls: AtomicUsize,
    last_batch_size: Mutex<Option<usize>>,
}

impl CountingModel {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            last_batch_size: Mutex::new(None),
        }
    }

    /// Every row scores `value`
    pub fn fixed(value: f64) -> Self {
        Self::with(Behaviour::Fixed(value))
    }

    /// Each row scores its `engagement_time`
    pub fn by_engagement() -> Self {
        Self::with(Behaviour::ByEngagement)
    }

    /// Returns one prediction fewer than requested
    pub fn truncating(value: f64) -> Self {
        Self::with(Behaviour::Truncating(value))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_batch_size(&self) -> Option<usize> {
        *self.last_batch_size.lock().unwrap()
    }
}

impl ScoringModel for CountingModel {
    fn fingerprint(&self) -> &str {
        "counting-model"
    }

    fn predict_many(&self, rows: &[FeatureRecord]) -> model::Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_batch_size.lock().unwrap() = Some(rows.len());

        Ok(match self.behaviour {
            Behaviour::Fixed(value) => vec![value; rows.len()],
            Behaviour::ByEngagement => rows.iter().map(|row| f64::from(row.engagement_time)).collect(),
            Behaviour::Truncating(value) => vec![value; rows.len().saturating_sub(1)],
        })
    }
}

/// Model that is never able to predict
pub struct FailingModel;

impl ScoringModel for FailingModel {
    fn fingerprint(&self) -> &str {
        "failing-model"
    }

    fn predict_many(&self, _rows: &[FeatureRecord]) -> model::Result<Vec<f64>> {
        Err(ModelError::Unavailable("test model always fails".to_string()))
    }
}

/// Store that behaves like an unreachable Redis
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<f64>, CacheError> {
        Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into())
    }

    async fn set(&self, _key: &str, _value: f64) -> Result<(), CacheError> {
        Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into())
    }
}

/// Store that never answers within any reasonable timeout
pub struct StalledStore;

#[async_trait]
impl CacheStore for StalledStore {
    fn backend(&self) -> &'static str {
        "stalled"
    }

    async fn get(&self, _key: &str) -> Result<Option<f64>, CacheError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: f64) -> Result<(), CacheError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(())
    }
}
