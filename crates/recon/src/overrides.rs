//! Manual override table built from the curation file.
//!
//! Overrides win over every automatic strategy. A village string naming
//! several villages maps one station onto several codes (a shared station);
//! its code list must pair one-to-one with the village names, with no
//! empty name or code on either side.

use std::collections::HashMap;

use crate::config::ResolveConfig;
use crate::error::ReconError;
use crate::model::{OverrideEntry, OverrideIssue};
use crate::normalize::CompositeKey;

/// Codes for a station shared by several villages, in curation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedTarget {
    pub villages: Vec<String>,
    pub villcodes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideTarget<'a> {
    Single(&'a str),
    Shared(&'a SharedTarget),
}

#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    single: HashMap<CompositeKey, String>,
    shared: HashMap<CompositeKey, SharedTarget>,
    issues: Vec<OverrideIssue>,
}

impl OverrideTable {
    /// Build the table. Entries without a suggested code are still awaiting
    /// curation and are ignored; malformed entries are dropped and reported
    /// through [`OverrideTable::issues`].
    pub fn build(entries: &[OverrideEntry], config: &ResolveConfig) -> Self {
        let mut table = Self::default();

        for entry in entries {
            if entry.suggested_villcode.trim().is_empty() {
                continue;
            }

            let key = CompositeKey::new(&entry.county, &entry.district, &entry.village);
            let villages = split_tokens(&entry.village, &config.village_delimiter);
            let villcodes = split_tokens(&entry.suggested_villcode, &config.villcode_delimiter);

            let paired = villages.len() == villcodes.len()
                && villages.iter().chain(&villcodes).all(|t| !t.is_empty());
            if !paired {
                let issue = OverrideIssue {
                    key: key.to_string(),
                    villages,
                    villcodes,
                };
                log::warn!("{issue}; entry skipped");
                table.issues.push(issue);
                continue;
            }

            if villages.len() > 1 {
                table.shared.insert(key, SharedTarget { villages, villcodes });
            } else if let Some(code) = villcodes.into_iter().next() {
                table.single.insert(key, code);
            }
        }

        log::info!(
            "overrides: {} single, {} shared, {} rejected",
            table.single.len(),
            table.shared.len(),
            table.issues.len()
        );
        table
    }

    /// Single-code overrides are consulted before shared ones.
    pub fn get(&self, key: &CompositeKey) -> Option<OverrideTarget<'_>> {
        if let Some(code) = self.single.get(key) {
            return Some(OverrideTarget::Single(code));
        }
        self.shared.get(key).map(OverrideTarget::Shared)
    }

    pub fn issues(&self) -> &[OverrideIssue] {
        &self.issues
    }

    pub fn single_len(&self) -> usize {
        self.single.len()
    }

    pub fn shared_len(&self) -> usize {
        self.shared.len()
    }
}

/// Trimmed tokens. Empty tokens are kept so a stray delimiter shows up as
/// a pairing error instead of being absorbed.
fn split_tokens(value: &str, delimiter: &str) -> Vec<String> {
    value.split(delimiter).map(|t| t.trim().to_string()).collect()
}

/// Parse the curation file: a JSON list of override entries.
pub fn load_override_file(input: &str) -> Result<Vec<OverrideEntry>, ReconError> {
    serde_json::from_str(input).map_err(|e| ReconError::json("overrides", e))
}
