//! Risk Aggregator — folds per-cohort results into one verdict.

use crate::models::{CohortResult, RiskVerdict};

/// Overall outlier ratio at or above this is classified High.
pub const HIGH_THRESHOLD: f64 = 0.20;

/// Overall outlier ratio at or above this (and below `HIGH_THRESHOLD`)
/// is classified Medium.
pub const MEDIUM_THRESHOLD: f64 = 0.10;

/// Population-weighted mean of per-cohort outlier ratios.
///
/// Cohorts skipped for being under the sample floor carry a player count
/// of 0 and contribute nothing. When no cohort was scored the ratio is
/// undefined and defaults to 0.
pub fn overall_ratio(results: &[CohortResult]) -> f64 {
    let total_players: usize = results.iter().map(|r| r.player_count).sum();
    if total_players == 0 {
        return 0.0;
    }
    let weighted: f64 = results
        .iter()
        .filter(|r| r.player_count > 0)
        .map(|r| {
            let ratio = r.outlier_count as f64 / r.player_count as f64;
            ratio * r.player_count as f64
        })
        .sum();
    weighted / total_players as f64
}

/// Map a ratio in [0, 1] onto the three-level verdict. Thresholds are
/// fixed constants, not configurable per call.
pub fn classify(ratio: f64) -> RiskVerdict {
    if ratio >= HIGH_THRESHOLD {
        RiskVerdict::High
    } else if ratio >= MEDIUM_THRESHOLD {
        RiskVerdict::Medium
    } else {
        RiskVerdict::Low
    }
}
