use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::ScoringError;
use super::types::{CacheKey, FeatureRecord};
use crate::cache::PredictionCache;
use crate::metrics;
use crate::model::ScoringModel;

/// Turns feature records into scores, consulting the prediction cache per record.
pub struct ScoringEngine {
    model: Arc<dyn ScoringModel>,
    cache: PredictionCache,
}

impl ScoringEngine {
    pub fn new(model: Arc<dyn ScoringModel>, cache: PredictionCache) -> Self {
        Self { model, cache }
    }

    pub fn cache_key(&self, record: &FeatureRecord) -> CacheKey {
        CacheKey::new(self.model.fingerprint(), record)
    }

    /// Score one record. A cached value is returned as-is without touching the model.
    #[instrument(skip_all)]
    pub async fn score(&self, record: &FeatureRecord) -> Result<f64, ScoringError> {
        let key = self.cache_key(record);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        metrics::record_model_invocation(1);
        let prediction = self.model.predict_one(record)?;
        ensure_finite(prediction)?;

        self.cache.set(&key, prediction).await;
        Ok(prediction)
    }

    /// Score many records, aligned with the input order.
    ///
    /// Every record is probed in the cache first; all misses go to the model in a single
    /// inference call and are spliced back into their original positions.
    #[instrument(skip_all, fields(batch_size = records.len()))]
    pub async fn score_batch(&self, records: &[FeatureRecord]) -> Result<Vec<f64>, ScoringError> {
        let keys: Vec<CacheKey> = records.iter().map(|r| self.cache_key(r)).collect();
        let cached: Vec<Option<f64>> = join_all(keys.iter().map(|key| self.cache.get(key))).await;

        let unresolved: Vec<usize> = cached
            .iter()
            .enumerate()
            .filter_map(|(idx, hit)| hit.is_none().then_some(idx))
            .collect();

        debug!(
            cached = records.len() - unresolved.len(),
            unresolved = unresolved.len(),
            "Probed prediction cache"
        );

        let mut results = cached;
        if !unresolved.is_empty() {
            let rows: Vec<FeatureRecord> = unresolved.iter().map(|&idx| records[idx].clone()).collect();

            metrics::record_model_invocation(rows.len());
            let predictions = self.model.predict_many(&rows)?;
            if predictions.len() != rows.len() {
                return Err(ScoringError::OutputShape {
                    expected: rows.len(),
                    actual: predictions.len(),
                });
            }
            for prediction in &predictions {
                ensure_finite(*prediction)?;
            }

            join_all(
                unresolved
                    .iter()
                    .zip(predictions.iter())
                    .map(|(&idx, &prediction)| self.cache.set(&keys[idx], prediction)),
            )
            .await;

            for (idx, prediction) in unresolved.into_iter().zip(predictions) {
                results[idx] = Some(prediction);
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(idx, prediction)| prediction.ok_or(ScoringError::Unfilled { position: idx }))
            .collect()
    }
}

fn ensure_finite(prediction: f64) -> Result<(), ScoringError> {
    if prediction.is_finite() {
        Ok(())
    } else {
        Err(ScoringError::NonFinite { value: prediction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryStore;
    use crate::model::ModelError;
    use crate::test_utils::{CountingModel, FailingModel, FailingStore, sample_record};
    use std::time::Duration;

    fn engine_with(model: Arc<CountingModel>) -> ScoringEngine {
        let cache = PredictionCache::new(Arc::new(MemoryStore::new(None, None)), Duration::from_millis(100));
        ScoringEngine::new(model, cache)
    }

    fn records(n: u32) -> Vec<FeatureRecord> {
        (0..n)
            .map(|i| FeatureRecord {
                engagement_time: i,
                ..sample_record()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_score_is_cached_after_first_call() {
        let model = Arc::new(CountingModel::fixed(72.345));
        let engine = engine_with(model.clone());

        let first = engine.score(&sample_record()).await.unwrap();
        let second = engine.score(&sample_record()).await.unwrap();

        assert_eq!(first, 72.345);
        assert_eq!(first, second);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_value_returned_unchanged() {
        let model = Arc::new(CountingModel::fixed(10.0));
        let engine = engine_with(model.clone());
        engine.cache.set(&engine.cache_key(&sample_record()), 99.5).await;

        assert_eq!(engine.score(&sample_record()).await.unwrap(), 99.5);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_of_one_matches_single() {
        let single = engine_with(Arc::new(CountingModel::by_engagement()));
        let batch = engine_with(Arc::new(CountingModel::by_engagement()));
        let record = FeatureRecord {
            engagement_time: 17,
            ..sample_record()
        };

        let expected = single.score(&record).await.unwrap();
        let actual = batch.score_batch(std::slice::from_ref(&record)).await.unwrap();

        assert_eq!(actual, vec![expected]);
    }

    #[tokio::test]
    async fn test_single_and_batch_share_cache_entries() {
        let model = Arc::new(CountingModel::by_engagement());
        let engine = engine_with(model.clone());
        let batch = records(3);

        engine.score_batch(&batch).await.unwrap();
        engine.score(&batch[1]).await.unwrap();

        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_invokes_model_once_and_preserves_order() {
        let model = Arc::new(CountingModel::by_engagement());
        let engine = engine_with(model.clone());
        let batch = records(6);

        // Warm positions 1 and 4 only
        engine.score(&batch[1]).await.unwrap();
        engine.score(&batch[4]).await.unwrap();
        assert_eq!(model.calls(), 2);

        let scores = engine.score_batch(&batch).await.unwrap();

        assert_eq!(scores, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(model.calls(), 3);
        assert_eq!(model.last_batch_size(), Some(4));
    }

    #[tokio::test]
    async fn test_fully_cached_batch_skips_model() {
        let model = Arc::new(CountingModel::by_engagement());
        let engine = engine_with(model.clone());
        let batch = records(5);

        let first = engine.score_batch(&batch).await.unwrap();
        let second = engine.score_batch(&batch).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_records() {
        let model = Arc::new(CountingModel::by_engagement());
        let engine = engine_with(model.clone());
        let batch = vec![sample_record(), sample_record(), sample_record()];

        let scores = engine.score_batch(&batch).await.unwrap();

        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| *s == scores[0]));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let cache = PredictionCache::new(Arc::new(MemoryStore::new(None, None)), Duration::from_millis(100));
        let engine = ScoringEngine::new(Arc::new(FailingModel), cache);

        let single = engine.score(&sample_record()).await;
        assert!(matches!(single, Err(ScoringError::Model(ModelError::Unavailable(_)))));

        let batch = engine.score_batch(&records(3)).await;
        assert!(matches!(batch, Err(ScoringError::Model(_))));
    }

    #[tokio::test]
    async fn test_failed_prediction_is_not_cached() {
        let cache = PredictionCache::new(Arc::new(MemoryStore::new(None, None)), Duration::from_millis(100));
        let failing = ScoringEngine::new(Arc::new(FailingModel), cache.clone());
        let _ = failing.score(&sample_record()).await;

        let key = failing.cache_key(&sample_record());
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_short_model_output_is_an_error() {
        let model = Arc::new(CountingModel::truncating(2.0));
        let engine = engine_with(model);

        let result = engine.score_batch(&records(3)).await;
        assert!(matches!(result, Err(ScoringError::OutputShape { expected: 3, actual: 2 })));
    }

    #[tokio::test]
    async fn test_non_finite_prediction_is_an_error() {
        let engine = engine_with(Arc::new(CountingModel::fixed(f64::NAN)));

        assert!(matches!(engine.score(&sample_record()).await, Err(ScoringError::NonFinite { .. })));
        assert!(matches!(engine.score_batch(&records(2)).await, Err(ScoringError::NonFinite { .. })));
    }

    #[tokio::test]
    async fn test_cache_outage_still_scores() {
        let model = Arc::new(CountingModel::by_engagement());
        let cache = PredictionCache::new(Arc::new(FailingStore), Duration::from_millis(100));
        let engine = ScoringEngine::new(model.clone(), cache);

        assert_eq!(engine.score(&records(4)[3]).await.unwrap(), 3.0);
        assert_eq!(engine.score_batch(&records(4)).await.unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(model.calls(), 2);
    }
}
