//! Cohort Orchestrator — concurrent per-level scoring pipeline.
//!
//! One task per distinct skill level: fetch cached history, merge with the
//! incoming records, score the merged cohort, persist the incoming
//! snapshot. All tasks are joined before aggregation; there is no partial
//! result, a failed cohort task fails the whole request.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::logic::isolation::{AnomalyScorer, ScoringError};
use crate::logic::{cohorts, features, risk};
use crate::models::{Cohort, CohortResult, FeatureRecord, RiskVerdict};
use crate::store::PlayerStore;

/// Cohorts smaller than this (incoming + cached) are skipped outright: an
/// isolation forest fitted on fewer samples is not trustworthy.
pub const MIN_COHORT_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error("cohort task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The full analysis pipeline. Holds explicit handles to the store and the
/// scorer so both can be swapped for doubles in tests.
pub struct AnalysisPipeline {
    store: Arc<dyn PlayerStore>,
    scorer: Arc<dyn AnomalyScorer>,
}

impl AnalysisPipeline {
    pub fn new(store: Arc<dyn PlayerStore>, scorer: Arc<dyn AnomalyScorer>) -> Self {
        Self { store, scorer }
    }

    /// Classify one request's batch of raw profiles.
    pub async fn analyze(&self, profiles: &[Value]) -> Result<RiskVerdict, PipelineError> {
        let records: Vec<FeatureRecord> = profiles.iter().filter_map(features::normalize).collect();
        tracing::debug!(
            "normalized {} of {} submitted profiles",
            records.len(),
            profiles.len()
        );

        let mut tasks = JoinSet::new();
        for (level, incoming) in cohorts::build_cohorts(records) {
            let store = Arc::clone(&self.store);
            let scorer = Arc::clone(&self.scorer);
            tasks.spawn(async move { score_level(store, scorer, level, incoming).await });
        }

        // Barrier: every cohort task completes before aggregation.
        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined??);
        }

        let ratio = risk::overall_ratio(&results);
        tracing::info!(
            "analyzed {} cohorts, overall outlier ratio {:.4}",
            results.len(),
            ratio
        );
        Ok(risk::classify(ratio))
    }
}

/// Score one skill level's cohort.
async fn score_level(
    store: Arc<dyn PlayerStore>,
    scorer: Arc<dyn AnomalyScorer>,
    level: String,
    incoming: Vec<FeatureRecord>,
) -> Result<CohortResult, ScoringError> {
    let cached = store.fetch(&level).await;
    let cohort = Cohort {
        level,
        incoming,
        cached,
    };

    let player_count = cohort.merged_len();
    if player_count < MIN_COHORT_SIZE {
        tracing::debug!(
            "cohort {} below sample floor ({} < {}), skipping",
            cohort.level,
            player_count,
            MIN_COHORT_SIZE
        );
        return Ok(CohortResult::skipped(cohort.level));
    }

    let matrix = cohort.feature_matrix();
    let flags = scorer.score_cohort(&matrix)?;
    let outlier_count = flags.iter().filter(|&&flag| flag).count();

    // Only the incoming snapshot is written back; cached entries keep
    // their original expiry.
    store.save(&cohort.level, &cohort.incoming).await;

    Ok(CohortResult {
        level: cohort.level,
        outlier_count,
        player_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::isolation::IsolationForest;
    use crate::models::FEATURE_COUNT;
    use crate::store::testing::MemoryPlayerStore;
    use serde_json::json;

    fn profile(level: &str, id: Option<&str>, kdr: f64, adr: f64) -> Value {
        let mut profile = json!({
            "metrics": {
                "level": level,
                "stats": {
                    "assists": 4, "clutches": 1, "deaths": 12, "firstKills": 2,
                    "headshots": 9, "kddiff": 3, "kdr": kdr, "adr": adr
                }
            }
        });
        if let Some(id) = id {
            profile["id"] = json!(id);
        }
        profile
    }

    fn cached_record(level: &str, id: &str) -> FeatureRecord {
        FeatureRecord {
            level: level.to_string(),
            features: [4.0, 1.0, 12.0, 2.0, 9.0, 3.0, 1.2, 84.0],
            player_id: Some(id.to_string()),
        }
    }

    fn pipeline_with(store: Arc<MemoryPlayerStore>) -> AnalysisPipeline {
        AnalysisPipeline::new(store, Arc::new(IsolationForest::with_seed(42)))
    }

    /// Flags the first `outliers` rows of every scored cohort.
    struct FixedScorer {
        outliers: usize,
    }

    impl AnomalyScorer for FixedScorer {
        fn score_cohort(
            &self,
            matrix: &[[f64; FEATURE_COUNT]],
        ) -> Result<Vec<bool>, ScoringError> {
            Ok((0..matrix.len()).map(|i| i < self.outliers).collect())
        }
    }

    #[tokio::test]
    async fn test_uniform_cohort_is_low_risk() {
        // Scenario: 12 near-identical vectors, no cached history.
        let store = Arc::new(MemoryPlayerStore::default());
        let pipeline = pipeline_with(Arc::clone(&store));
        let profiles: Vec<Value> = (0..12)
            .map(|i| profile("gold", Some(&format!("p{i}")), 1.2, 84.0))
            .collect();
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Low);
        // The incoming snapshot was persisted.
        assert_eq!(store.len(), 12);
    }

    #[tokio::test]
    async fn test_outlier_heavy_cohort_is_high_risk() {
        // Scenario: 8 normal + 4 extreme vectors in one cohort.
        let store = Arc::new(MemoryPlayerStore::default());
        let pipeline = pipeline_with(Arc::clone(&store));
        let mut profiles: Vec<Value> = (0..8)
            .map(|i| profile("gold", Some(&format!("p{i}")), 1.2, 84.0))
            .collect();
        for i in 0..4 {
            profiles.push(profile(
                "gold",
                Some(&format!("x{i}")),
                500.0 + 100.0 * i as f64,
                9000.0,
            ));
        }
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::High);
    }

    #[tokio::test]
    async fn test_empty_batch_defaults_to_low() {
        let pipeline = pipeline_with(Arc::new(MemoryPlayerStore::default()));
        let verdict = pipeline.analyze(&[]).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Low);
    }

    #[tokio::test]
    async fn test_under_floor_cohort_is_skipped_and_not_persisted() {
        let store = Arc::new(MemoryPlayerStore::default());
        let pipeline = pipeline_with(Arc::clone(&store));
        let profiles: Vec<Value> = (0..9)
            .map(|i| profile("gold", Some(&format!("p{i}")), 1.2, 84.0))
            .collect();
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Low);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_cohort_at_exact_floor_is_scored() {
        // The floor is 10 merged records, inclusive.
        let store = Arc::new(MemoryPlayerStore::default());
        let pipeline = pipeline_with(Arc::clone(&store));
        let profiles: Vec<Value> = (0..10)
            .map(|i| profile("gold", Some(&format!("p{i}")), 1.2, 84.0))
            .collect();
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Low);
        // The scored branch ran, so the snapshot was persisted.
        assert_eq!(store.len(), 10);
    }

    #[tokio::test]
    async fn test_profiles_without_level_never_reach_a_cohort() {
        // 9 valid + 5 level-less: the floor stays unmet, so the invalid
        // profiles cannot have been counted anywhere.
        let store = Arc::new(MemoryPlayerStore::default());
        let pipeline = pipeline_with(Arc::clone(&store));
        let mut profiles: Vec<Value> = (0..9)
            .map(|i| profile("gold", Some(&format!("p{i}")), 1.2, 84.0))
            .collect();
        for _ in 0..5 {
            profiles.push(json!({ "metrics": { "stats": { "kdr": 1.0 } } }));
        }
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Low);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_cached_history_lifts_cohort_over_floor() {
        let store = Arc::new(MemoryPlayerStore::default());
        for i in 0..6 {
            store
                .save("gold", &[cached_record("gold", &format!("old{i}"))])
                .await;
        }
        let pipeline = pipeline_with(Arc::clone(&store));
        let profiles: Vec<Value> = (0..6)
            .map(|i| profile("gold", Some(&format!("new{i}")), 1.2, 84.0))
            .collect();
        // 6 incoming + 6 cached = 12 merged, identical features: Low.
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Low);
        // Incoming records were written back next to the old ones.
        assert_eq!(store.len(), 12);
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_empty_cache() {
        let store = Arc::new(MemoryPlayerStore::failing());
        let pipeline = pipeline_with(Arc::clone(&store));
        let profiles: Vec<Value> = (0..12)
            .map(|i| profile("gold", Some(&format!("p{i}")), 1.2, 84.0))
            .collect();
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Low);
    }

    #[tokio::test]
    async fn test_mixed_cohorts_weighted_verdict() {
        // Scenario: one cohort under the floor, one at ratio 0.15 with 20
        // players: overall 0.15, Medium.
        let store = Arc::new(MemoryPlayerStore::default());
        let pipeline = AnalysisPipeline::new(
            Arc::clone(&store) as Arc<dyn PlayerStore>,
            Arc::new(FixedScorer { outliers: 3 }),
        );
        let mut profiles: Vec<Value> = (0..20)
            .map(|i| profile("gold", Some(&format!("g{i}")), 1.2, 84.0))
            .collect();
        for i in 0..5 {
            profiles.push(profile("silver", Some(&format!("s{i}")), 0.8, 60.0));
        }
        let verdict = pipeline.analyze(&profiles).await.unwrap();
        assert_eq!(verdict, RiskVerdict::Medium);
    }

    #[tokio::test]
    async fn test_corrupt_cached_features_fail_the_request() {
        let store = Arc::new(MemoryPlayerStore::default());
        let mut corrupt = cached_record("gold", "bad");
        corrupt.features[3] = f64::INFINITY;
        store.save("gold", &[corrupt]).await;
        let pipeline = pipeline_with(Arc::clone(&store));
        let profiles: Vec<Value> = (0..11)
            .map(|i| profile("gold", Some(&format!("p{i}")), 1.2, 84.0))
            .collect();
        let err = pipeline.analyze(&profiles).await.unwrap_err();
        assert!(matches!(err, PipelineError::Scoring(_)));
    }
}
