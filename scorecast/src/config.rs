//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SCORECAST_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SCORECAST_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SCORECAST_CACHE__BACKEND=redis` sets the `cache.backend` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Model**: `model.path` - Location of the trained model artifact
//! - **Cache**: `cache.backend`, `cache.timeout`, `cache.redis_url` - Prediction cache
//! - **Authentication**: `secret_key`, `auth.api_keys`, `auth.users` - Token signing and API keys
//! - **Limits**: `limits.max_batch_size` - Batch request bounds
//! - **Features**: `enable_metrics`, `enable_otel_export` - Optional feature toggles
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! SCORECAST_PORT=8080
//!
//! # Token signing key (required)
//! SCORECAST_SECRET_KEY="change-me"
//!
//! # Use a shared redis cache
//! SCORECAST_CACHE__BACKEND=redis
//! SCORECAST_CACHE__REDIS_URL="redis://localhost:6379/0"
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::errors::Error;

/// Largest batch the service will ever accept in a single request
pub const MAX_BATCH_SIZE: usize = 200;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SCORECAST_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    /// Print an Argon2 hash of the given password (for `auth.users`) and exit.
    #[arg(long, value_name = "PASSWORD")]
    pub hash_password: Option<String>,

    /// Fit a model artifact from a CSV of graded students and exit.
    #[arg(long, value_name = "CSV")]
    pub train: Option<PathBuf>,

    /// Where `--train` writes the artifact (default: `models/student_score_model.json`).
    #[arg(long, value_name = "PATH", requires = "train")]
    pub output: Option<PathBuf>,

    /// Version recorded in the trained artifact; it namespaces cached predictions.
    #[arg(long, value_name = "VERSION", requires = "train")]
    pub model_version: Option<String>,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret key for JWT signing (required)
    pub secret_key: Option<String>,
    /// Trained model artifact
    pub model: ModelConfig,
    /// Prediction cache configuration
    pub cache: CacheConfig,
    /// Credential and API key configuration
    pub auth: AuthConfig,
    /// Request size limits
    pub limits: LimitsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Model artifact location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Path to the JSON model artifact exported by the training job
    pub path: PathBuf,
}

/// Which store backs the prediction cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process cache, local to each replica
    Memory,
    /// Shared redis instance
    Redis,
    /// No caching; every prediction hits the model
    Disabled,
}

/// Prediction cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Backing store
    pub backend: CacheBackend,
    /// Upper bound on any single cache read or write; slower calls count as a miss
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Connection URL, required for the redis backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    /// Maximum entries held by the memory backend (unbounded if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<u64>,
    /// Entry lifetime for the memory backend (no expiry if unset)
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<Duration>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Lifetime of issued access tokens
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    /// Header carrying the static API key
    pub api_key_header: String,
    /// Accepted API keys
    pub api_keys: Vec<String>,
    /// Users allowed to request access tokens
    pub users: Vec<UserCredentials>,
}

/// A user that may exchange a password for an access token.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserCredentials {
    pub username: String,
    /// Argon2 PHC string, see `scorecast --hash-password`
    pub password_hash: String,
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum records in one batch request (1 to 200)
    pub max_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            secret_key: None,
            model: ModelConfig::default(),
            cache: CacheConfig::default(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/student_score_model.json"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            timeout: Duration::from_millis(250),
            redis_url: None,
            max_capacity: None,
            time_to_live: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(30 * 60), // 30 minutes
            api_key_header: "x-api-key".to_string(),
            api_keys: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                     Please set SCORECAST_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        if self.auth.api_keys.iter().all(|key| key.trim().is_empty()) {
            return Err(Error::Internal {
                operation: "Config validation: auth.api_keys must contain at least one non-empty key".to_string(),
            });
        }

        if self.auth.api_key_header.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: auth.api_key_header cannot be empty".to_string(),
            });
        }

        if self.auth.jwt_expiry.as_secs() < 60 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too short (minimum 1 minute)".to_string(),
            });
        }

        if self.auth.jwt_expiry.as_secs() > 86400 * 30 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too long (maximum 30 days)".to_string(),
            });
        }

        if self.limits.max_batch_size == 0 || self.limits.max_batch_size > MAX_BATCH_SIZE {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: limits.max_batch_size ({}) must be between 1 and {MAX_BATCH_SIZE}",
                    self.limits.max_batch_size
                ),
            });
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(Error::Internal {
                operation: "Config validation: cache.backend is redis but cache.redis_url is not set".to_string(),
            });
        }

        if self.cache.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: cache.timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("SCORECAST_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
