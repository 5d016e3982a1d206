//! Cohort and risk verdict models.

use serde::{Deserialize, Serialize};

use super::profile::{FeatureRecord, FEATURE_COUNT};

/// One skill level's records: the current request plus cached history.
#[derive(Debug, Clone)]
pub struct Cohort {
    pub level: String,
    /// Records from the current request
    pub incoming: Vec<FeatureRecord>,
    /// Records fetched from the player cache for the same level
    pub cached: Vec<FeatureRecord>,
}

impl Cohort {
    pub fn merged_len(&self) -> usize {
        self.incoming.len() + self.cached.len()
    }

    /// Merged feature matrix (incoming first, then cached), used only for
    /// scoring. The level column never enters the feature space.
    pub fn feature_matrix(&self) -> Vec<[f64; FEATURE_COUNT]> {
        self.incoming
            .iter()
            .chain(self.cached.iter())
            .map(|record| record.features)
            .collect()
    }
}

/// Per-cohort scoring outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortResult {
    pub level: String,
    pub outlier_count: usize,
    pub player_count: usize,
}

impl CohortResult {
    /// Result for a cohort below the minimum sample size: it contributes
    /// nothing to the aggregate.
    pub fn skipped(level: String) -> Self {
        Self {
            level,
            outlier_count: 0,
            player_count: 0,
        }
    }
}

/// Final classification of a request's overall outlier ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskVerdict {
    Low,
    Medium,
    High,
}
