//! Automatic matching strategies, tried in configured order; first hit wins.

use crate::config::{ResolveConfig, StrategyKind};
use crate::normalize::CompositeKey;
use crate::registry::RegistryIndex;

/// One way of finding a registry code for a composite key.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_match(&self, key: &CompositeKey, index: &RegistryIndex) -> Option<String>;
}

/// Key looked up as-is.
pub struct ExactMatch;

impl MatchStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn try_match(&self, key: &CompositeKey, index: &RegistryIndex) -> Option<String> {
        index.get(key).map(str::to_string)
    }
}

/// Drops one leading administrative-level character from the district.
pub struct DistrictPrefixStrip {
    prefixes: Vec<char>,
}

impl DistrictPrefixStrip {
    pub fn new(prefixes: Vec<char>) -> Self {
        Self { prefixes }
    }
}

impl MatchStrategy for DistrictPrefixStrip {
    fn name(&self) -> &'static str {
        "district_prefix"
    }

    fn try_match(&self, key: &CompositeKey, index: &RegistryIndex) -> Option<String> {
        let first = key.district.chars().next()?;
        if !self.prefixes.contains(&first) {
            return None;
        }
        let stripped = &key.district[first.len_utf8()..];
        index.get(&key.with_district(stripped)).map(str::to_string)
    }
}

/// Retries the village under its suffix spellings (`C` ↔ `C里` ↔ `C村`).
pub struct VillageSuffixVariants {
    suffixes: Vec<char>,
}

impl VillageSuffixVariants {
    pub fn new(suffixes: Vec<char>) -> Self {
        Self { suffixes }
    }

    /// Candidate spellings in lookup order: the name itself, the name with each
    /// suffix appended (unless already present), then the name with every
    /// suffix character removed and each suffix appended. Duplicates dropped.
    pub fn variants(&self, village: &str) -> Vec<String> {
        let base: String = village.chars().filter(|c| !self.suffixes.contains(c)).collect();

        let mut out = vec![village.to_string()];
        for &suffix in &self.suffixes {
            let variant = if village.ends_with(suffix) {
                village.to_string()
            } else {
                format!("{village}{suffix}")
            };
            push_unique(&mut out, variant);
        }
        for &suffix in &self.suffixes {
            push_unique(&mut out, format!("{base}{suffix}"));
        }
        out
    }
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

impl MatchStrategy for VillageSuffixVariants {
    fn name(&self) -> &'static str {
        "village_suffix"
    }

    fn try_match(&self, key: &CompositeKey, index: &RegistryIndex) -> Option<String> {
        self.variants(&key.village)
            .iter()
            .find_map(|v| index.get(&key.with_village(v)))
            .map(str::to_string)
    }
}

/// Ordered strategy list.
pub struct MatchChain {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl MatchChain {
    pub fn new(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn from_config(config: &ResolveConfig) -> Self {
        let strategies = config
            .strategies
            .iter()
            .map(|kind| -> Box<dyn MatchStrategy> {
                match kind {
                    StrategyKind::Exact => Box::new(ExactMatch),
                    StrategyKind::DistrictPrefix => {
                        Box::new(DistrictPrefixStrip::new(config.district_prefixes.clone()))
                    }
                    StrategyKind::VillageSuffix => {
                        Box::new(VillageSuffixVariants::new(config.village_suffixes.clone()))
                    }
                }
            })
            .collect();
        Self::new(strategies)
    }

    /// First strategy that finds a code, with that strategy's name.
    pub fn resolve(
        &self,
        key: &CompositeKey,
        index: &RegistryIndex,
    ) -> Option<(String, &'static str)> {
        self.strategies
            .iter()
            .find_map(|s| s.try_match(key, index).map(|code| (code, s.name())))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RegistryEntry;

    fn index(rows: &[(&str, &str, &str, &str)]) -> RegistryIndex {
        let entries: Vec<RegistryEntry> = rows
            .iter()
            .map(|(c, t, v, code)| RegistryEntry {
                county: c.to_string(),
                subdivision: t.to_string(),
                village: v.to_string(),
                villcode: code.to_string(),
            })
            .collect();
        RegistryIndex::build(&entries)
    }

    fn suffixes() -> VillageSuffixVariants {
        VillageSuffixVariants::new(vec!['里', '村'])
    }

    #[test]
    fn variants_order() {
        assert_eq!(suffixes().variants("東勢"), vec!["東勢", "東勢里", "東勢村"]);
        assert_eq!(suffixes().variants("東勢里"), vec!["東勢里", "東勢里村", "東勢村"]);
        assert_eq!(suffixes().variants("東勢村"), vec!["東勢村", "東勢村里", "東勢里"]);
    }

    #[test]
    fn suffix_appended() {
        let idx = index(&[("A", "B", "C里", "0001")]);
        let key = CompositeKey::new("A", "B", "C");
        assert_eq!(ExactMatch.try_match(&key, &idx), None);
        assert_eq!(suffixes().try_match(&key, &idx).as_deref(), Some("0001"));
    }

    #[test]
    fn suffix_swapped() {
        let idx = index(&[("A", "B", "C村", "0002")]);
        let key = CompositeKey::new("A", "B", "C里");
        assert_eq!(suffixes().try_match(&key, &idx).as_deref(), Some("0002"));
    }

    #[test]
    fn district_prefix_stripped() {
        let strip = DistrictPrefixStrip::new(vec!['市', '縣', '區', '鄉', '鎮']);
        let idx = index(&[("A", "B", "C", "0003")]);
        assert_eq!(
            strip.try_match(&CompositeKey::new("A", "區B", "C"), &idx).as_deref(),
            Some("0003")
        );
        // Only a single leading character is removed.
        assert_eq!(strip.try_match(&CompositeKey::new("A", "區區B", "C"), &idx), None);
        // Nothing to strip.
        assert_eq!(strip.try_match(&CompositeKey::new("A", "XB", "C"), &idx), None);
        assert_eq!(strip.try_match(&CompositeKey::new("A", "", "C"), &idx), None);
    }

    #[test]
    fn chain_reports_first_hit() {
        let idx = index(&[("A", "B", "C", "0001"), ("A", "B", "D里", "0002")]);
        let chain = MatchChain::from_config(&ResolveConfig::default());
        assert_eq!(chain.names(), vec!["exact", "district_prefix", "village_suffix"]);
        assert_eq!(
            chain.resolve(&CompositeKey::new("A", "B", "C"), &idx),
            Some(("0001".to_string(), "exact"))
        );
        assert_eq!(
            chain.resolve(&CompositeKey::new("A", "B", "D"), &idx),
            Some(("0002".to_string(), "village_suffix"))
        );
        assert_eq!(chain.resolve(&CompositeKey::new("A", "B", "E"), &idx), None);
    }

    #[test]
    fn chain_respects_configured_order() {
        let config = ResolveConfig {
            strategies: vec![StrategyKind::Exact],
            ..ResolveConfig::default()
        };
        let idx = index(&[("A", "B", "D里", "0002")]);
        let chain = MatchChain::from_config(&config);
        assert_eq!(chain.resolve(&CompositeKey::new("A", "B", "D"), &idx), None);
    }
}
