use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Version tag of the cache key layout. Bump when [`CacheKey`] rendering changes.
pub const CACHE_KEY_VERSION: &str = "v1";

/// Field names in the order the model expects them
pub const FEATURE_NAMES: [&str; 5] = ["comprehension", "attention", "focus", "retention", "engagement_time"];

/// Measured attributes of one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct FeatureRecord {
    /// Reading comprehension score
    #[schema(example = 0.8)]
    pub comprehension: f64,
    /// Attention score
    #[schema(example = 0.6)]
    pub attention: f64,
    /// Focus score
    #[schema(example = 0.7)]
    pub focus: f64,
    /// Retention score
    #[schema(example = 0.9)]
    pub retention: f64,
    /// Engagement time in minutes
    #[schema(example = 45)]
    pub engagement_time: u32,
}

impl FeatureRecord {
    /// Feature vector in [`FEATURE_NAMES`] order
    pub fn to_row(&self) -> [f64; 5] {
        [
            self.comprehension,
            self.attention,
            self.focus,
            self.retention,
            f64::from(self.engagement_time),
        ]
    }
}

/// Cache lookup key for a single prediction.
///
/// Layout: `<version>:<model fingerprint>:<comprehension> <attention> <focus> <retention> <engagement_time>`.
/// Floats use their shortest round-trip rendering which always carries a decimal point or
/// exponent (`1.0`, never `1`), while `engagement_time` is always a bare integer, so values
/// of different kinds never render the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(model_fingerprint: &str, record: &FeatureRecord) -> Self {
        Self(format!(
            "{CACHE_KEY_VERSION}:{model_fingerprint}:{:?} {:?} {:?} {:?} {}",
            record.comprehension, record.attention, record.focus, record.retention, record.engagement_time
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
