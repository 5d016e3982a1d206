//! Profile Normalizer
//!
//! Turns one raw profile JSON object into a `FeatureRecord` with exactly
//! the fixed feature layout. Profiles that cannot produce a record are
//! dropped, never turned into request failures.

use serde_json::Value;

use crate::models::{FeatureRecord, RawProfile, FEATURE_COUNT, FEATURE_LAYOUT};

/// Normalize one raw profile into a feature record.
///
/// Returns `None` when the profile has no `metrics.level` or when
/// `metrics`/`stats` are not objects. Dropping such profiles is deliberate
/// policy: a malformed profile is excluded from aggregation instead of
/// aborting the whole request. Missing or non-numeric individual stats
/// default to 0; extra stats are ignored.
pub fn normalize(value: &Value) -> Option<FeatureRecord> {
    let profile: RawProfile = serde_json::from_value(value.clone()).ok()?;
    let metrics = profile.metrics.as_ref()?;
    let level = metrics.level.as_ref()?.as_category();

    let mut features = [0.0; FEATURE_COUNT];
    if let Some(stats) = metrics.stats.as_ref() {
        for (slot, name) in features.iter_mut().zip(FEATURE_LAYOUT) {
            *slot = stats.get(name).and_then(Value::as_f64).unwrap_or(0.0);
        }
    }

    Some(FeatureRecord {
        level,
        features,
        player_id: profile.player_id().map(str::to_owned),
    })
}
