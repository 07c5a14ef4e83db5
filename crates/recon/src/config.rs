use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Run configuration. Every field has a default, so an empty document is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveConfig {
    #[serde(default)]
    pub apportion: ApportionPolicy,
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,
    #[serde(default = "default_district_prefixes")]
    pub district_prefixes: Vec<char>,
    #[serde(default = "default_village_suffixes")]
    pub village_suffixes: Vec<char>,
    #[serde(default = "default_village_delimiter")]
    pub village_delimiter: String,
    #[serde(default = "default_villcode_delimiter")]
    pub villcode_delimiter: String,
    #[serde(default)]
    pub keep_unresolved: bool,
    #[serde(default = "default_unmatched_note")]
    pub unmatched_note: String,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            apportion: ApportionPolicy::default(),
            strategies: default_strategies(),
            district_prefixes: default_district_prefixes(),
            village_suffixes: default_village_suffixes(),
            village_delimiter: default_village_delimiter(),
            villcode_delimiter: default_villcode_delimiter(),
            keep_unresolved: false,
            unmatched_note: default_unmatched_note(),
        }
    }
}

// ---------------------------------------------------------------------------
// Apportionment
// ---------------------------------------------------------------------------

/// How a station shared by several villages is split between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApportionPolicy {
    /// Every village receives `floor(value / n)` of each count.
    #[default]
    Truncate,
    /// Every village receives the station's full counts.
    Replicate,
}

impl std::fmt::Display for ApportionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncate => write!(f, "truncate"),
            Self::Replicate => write!(f, "replicate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Exact,
    DistrictPrefix,
    VillageSuffix,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::DistrictPrefix => write!(f, "district_prefix"),
            Self::VillageSuffix => write!(f, "village_suffix"),
        }
    }
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![
        StrategyKind::Exact,
        StrategyKind::DistrictPrefix,
        StrategyKind::VillageSuffix,
    ]
}

fn default_district_prefixes() -> Vec<char> {
    vec!['市', '縣', '區', '鄉', '鎮']
}

fn default_village_suffixes() -> Vec<char> {
    vec!['里', '村']
}

fn default_village_delimiter() -> String {
    "、".into()
}

fn default_villcode_delimiter() -> String {
    ",".into()
}

fn default_unmatched_note() -> String {
    "Needs manual VILLCODE mapping".into()
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ResolveConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ResolveConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.strategies.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one matching strategy is required".into(),
            ));
        }

        for (i, kind) in self.strategies.iter().enumerate() {
            if self.strategies[..i].contains(kind) {
                return Err(ReconError::ConfigValidation(format!(
                    "strategy '{kind}' listed more than once"
                )));
            }
        }

        if self.village_delimiter.is_empty() {
            return Err(ReconError::ConfigValidation(
                "village_delimiter must not be empty".into(),
            ));
        }
        if self.villcode_delimiter.is_empty() {
            return Err(ReconError::ConfigValidation(
                "villcode_delimiter must not be empty".into(),
            ));
        }

        if self.strategies.contains(&StrategyKind::VillageSuffix)
            && self.village_suffixes.is_empty()
        {
            return Err(ReconError::ConfigValidation(
                "village_suffix strategy needs at least one village suffix".into(),
            ));
        }
        if self.strategies.contains(&StrategyKind::DistrictPrefix)
            && self.district_prefixes.is_empty()
        {
            return Err(ReconError::ConfigValidation(
                "district_prefix strategy needs at least one district prefix".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
