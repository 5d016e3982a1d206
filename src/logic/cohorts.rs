//! Cohort Builder — groups normalized records by skill level.

use std::collections::HashMap;

use crate::models::FeatureRecord;

/// Group records by skill level. Pure, no I/O; insertion order within a
/// level carries no meaning.
pub fn build_cohorts(records: Vec<FeatureRecord>) -> HashMap<String, Vec<FeatureRecord>> {
    let mut cohorts: HashMap<String, Vec<FeatureRecord>> = HashMap::new();
    for record in records {
        cohorts.entry(record.level.clone()).or_default().push(record);
    }
    cohorts
}
