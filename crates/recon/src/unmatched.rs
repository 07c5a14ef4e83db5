use std::collections::HashSet;

use crate::error::ReconError;
use crate::model::UnmatchedDescriptor;
use crate::normalize::CompositeKey;

/// Records that failed every strategy, one descriptor per composite key,
/// in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct UnmatchedTracker {
    seen: HashSet<String>,
    entries: Vec<UnmatchedDescriptor>,
}

impl UnmatchedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key was already seen; the first descriptor is kept.
    pub fn record(&mut self, key: &CompositeKey, descriptor: UnmatchedDescriptor) -> bool {
        if !self.seen.insert(key.to_string()) {
            return false;
        }
        self.entries.push(descriptor);
        true
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.seen.contains(&key.to_string())
    }

    pub fn export(&self) -> Vec<UnmatchedDescriptor> {
        self.entries.clone()
    }

    pub fn into_entries(self) -> Vec<UnmatchedDescriptor> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append another tracker's entries whose keys are new here.
    pub fn merge(&mut self, other: UnmatchedTracker) {
        for entry in other.entries {
            if self.seen.insert(entry.key()) {
                self.entries.push(entry);
            }
        }
    }

    /// Combine with a previously persisted curation list. `existing` keeps
    /// its order and content; tracked entries with new keys follow it.
    /// Keys on both sides are compared in normalized form.
    pub fn merge_into(&self, existing: Vec<UnmatchedDescriptor>) -> Vec<UnmatchedDescriptor> {
        let known: HashSet<String> = existing.iter().map(UnmatchedDescriptor::key).collect();
        let mut combined = existing;
        combined.extend(
            self.entries
                .iter()
                .filter(|e| !known.contains(&e.key()))
                .cloned(),
        );
        combined
    }
}

/// Parse a persisted curation list. Anything other than a JSON array is an error.
pub fn load_unmatched_file(input: &str) -> Result<Vec<UnmatchedDescriptor>, ReconError> {
    serde_json::from_str(input).map_err(|e| ReconError::json("unmatched list", e))
}
