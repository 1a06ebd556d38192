//! Prediction metrics recorded through the `metrics` facade.
//!
//! When `enable_metrics` is set, the axum-prometheus layer installs the global Prometheus
//! recorder and these counters are rendered alongside the HTTP metrics at `/internal/metrics`.
//! Without a recorder every call is a no-op.

pub const CACHE_HITS: &str = "scorecast_cache_hits_total";
pub const CACHE_MISSES: &str = "scorecast_cache_misses_total";
pub const CACHE_ERRORS: &str = "scorecast_cache_errors_total";
pub const MODEL_INVOCATIONS: &str = "scorecast_model_invocations_total";
pub const MODEL_ROWS: &str = "scorecast_model_rows_total";
pub const PREDICTIONS: &str = "scorecast_predictions_total";

pub fn record_cache_hit() {
    metrics::counter!(CACHE_HITS).increment(1);
}

pub fn record_cache_miss() {
    metrics::counter!(CACHE_MISSES).increment(1);
}

/// `op` is either `get` or `set`
pub fn record_cache_error(op: &'static str) {
    metrics::counter!(CACHE_ERRORS, "op" => op).increment(1);
}

pub fn record_model_invocation(rows: usize) {
    metrics::counter!(MODEL_INVOCATIONS).increment(1);
    metrics::counter!(MODEL_ROWS).increment(rows as u64);
}

/// `kind` is either `single` or `batch`
pub fn record_predictions(kind: &'static str, count: usize) {
    metrics::counter!(PREDICTIONS, "kind" => kind).increment(count as u64);
}
