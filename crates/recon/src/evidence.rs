use crate::engine::Resolution;
use crate::model::ResolutionSummary;

/// Compute summary statistics from a finished resolution.
pub fn compute_summary(resolution: &Resolution, override_issues: usize) -> ResolutionSummary {
    let counts = &resolution.counts;
    ResolutionSummary {
        records: counts.records,
        leaf_records: counts.leaf,
        skipped_records: counts.skipped,
        resolved_records: counts.resolved,
        unresolved_records: counts.unresolved,
        villages: resolution.villages.len(),
        unmatched_keys: resolution.unmatched.len(),
        override_issues,
        method_counts: counts.methods.clone(),
    }
}
