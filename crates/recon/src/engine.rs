use std::collections::BTreeMap;

use crate::aggregate::{Aggregator, StationShare};
use crate::config::{ApportionPolicy, ResolveConfig};
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::matcher::MatchChain;
use crate::model::{
    AggregatedVillage, ReconInput, ReconMeta, ReconResult, SourceRecord, StationContribution,
    UnmatchedDescriptor,
};
use crate::normalize::CompositeKey;
use crate::overrides::{OverrideTable, OverrideTarget};
use crate::registry::RegistryIndex;
use crate::unmatched::UnmatchedTracker;
use crate::verify::{aggregated_totals, raw_totals, verify_totals};

const METHOD_OVERRIDE: &str = "override";
const METHOD_SHARED_OVERRIDE: &str = "shared_override";

/// Run resolution per config. Returns aggregated villages plus diagnostics.
pub fn run(config: &ResolveConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    config.validate()?;

    let index = RegistryIndex::build(&input.registry);
    log::info!(
        "registry: {} entries indexed ({} overwritten)",
        index.len(),
        index.overwritten()
    );
    let overrides = OverrideTable::build(&input.overrides, config);

    let resolution = Resolver::new(config, &index, &overrides).resolve(&input.records);

    let raw = raw_totals(&input.records);
    let aggregated = aggregated_totals(resolution.villages.values().chain(&resolution.unresolved));
    let verification = verify_totals(&raw, &aggregated);

    let summary = compute_summary(&resolution, overrides.issues().len());
    log::info!(
        "resolved {} of {} leaf records into {} villages; {} unmatched keys",
        summary.resolved_records,
        summary.leaf_records,
        summary.villages,
        summary.unmatched_keys
    );

    Ok(ReconResult {
        meta: ReconMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            apportion: config.apportion,
            strategies: config.strategies.clone(),
        },
        summary,
        villages: resolution.villages,
        unresolved: resolution.unresolved,
        unmatched: resolution.unmatched,
        override_issues: overrides.issues().to_vec(),
        verification,
    })
}

/// Parse a JSON array of polling-station records.
pub fn load_records_json(input: &str) -> Result<Vec<SourceRecord>, ReconError> {
    serde_json::from_str(input).map_err(|e| ReconError::json("records", e))
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Record tallies for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub records: usize,
    pub leaf: usize,
    pub skipped: usize,
    pub resolved: usize,
    pub unresolved: usize,
    /// Resolved records per method (`override`, `shared_override`, strategy name).
    pub methods: BTreeMap<String, usize>,
}

impl RecordCounts {
    fn merge(&mut self, other: RecordCounts) {
        self.records += other.records;
        self.leaf += other.leaf;
        self.skipped += other.skipped;
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
        for (method, n) in other.methods {
            *self.methods.entry(method).or_insert(0) += n;
        }
    }

    fn note_method(&mut self, method: &str) {
        self.resolved += 1;
        *self.methods.entry(method.to_string()).or_insert(0) += 1;
    }
}

/// Mutable working state of a resolution pass. Owned by the caller so a run
/// can be split into shards and merged back.
#[derive(Debug, Clone, Default)]
pub struct ResolutionState {
    aggregator: Aggregator,
    unmatched: UnmatchedTracker,
    counts: RecordCounts,
}

impl ResolutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the state of another shard. Shards merged in input order
    /// reproduce the unmatched order of a single pass.
    pub fn merge(&mut self, other: ResolutionState) {
        self.aggregator.merge(other.aggregator);
        self.unmatched.merge(other.unmatched);
        self.counts.merge(other.counts);
    }

    pub fn finish(self) -> Resolution {
        let (villages, unresolved) = self.aggregator.finish();
        Resolution {
            villages,
            unresolved,
            unmatched: self.unmatched.into_entries(),
            counts: self.counts,
        }
    }
}

/// Finalized output of a resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub villages: BTreeMap<String, AggregatedVillage>,
    pub unresolved: Vec<AggregatedVillage>,
    pub unmatched: Vec<UnmatchedDescriptor>,
    pub counts: RecordCounts,
}

pub struct Resolver<'a> {
    config: &'a ResolveConfig,
    index: &'a RegistryIndex,
    overrides: &'a OverrideTable,
    chain: MatchChain,
}

impl<'a> Resolver<'a> {
    pub fn new(
        config: &'a ResolveConfig,
        index: &'a RegistryIndex,
        overrides: &'a OverrideTable,
    ) -> Self {
        Self {
            config,
            index,
            overrides,
            chain: MatchChain::from_config(config),
        }
    }

    /// Use a custom strategy chain instead of the configured one.
    pub fn with_chain(mut self, chain: MatchChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn resolve(&self, records: &[SourceRecord]) -> Resolution {
        let mut state = ResolutionState::new();
        self.resolve_into(records, &mut state);
        state.finish()
    }

    pub fn resolve_into(&self, records: &[SourceRecord], state: &mut ResolutionState) {
        for record in records {
            self.resolve_record(record, state);
        }
    }

    fn resolve_record(&self, record: &SourceRecord, state: &mut ResolutionState) {
        state.counts.records += 1;
        if !record.is_leaf() {
            state.counts.skipped += 1;
            return;
        }
        state.counts.leaf += 1;

        let key = CompositeKey::new(&record.county, &record.district, &record.village);

        match self.overrides.get(&key) {
            Some(OverrideTarget::Single(code)) => {
                state.aggregator.contribute(
                    code,
                    &key,
                    StationContribution::whole(record),
                    StationShare::Whole,
                );
                state.counts.note_method(METHOD_OVERRIDE);
            }
            Some(OverrideTarget::Shared(target)) => {
                let n = target.villcodes.len();
                let share = match self.config.apportion {
                    ApportionPolicy::Truncate => StationShare::Fraction(n),
                    ApportionPolicy::Replicate => StationShare::Whole,
                };
                for code in &target.villcodes {
                    state.aggregator.contribute(
                        code,
                        &key,
                        StationContribution::shared(record, n, self.config.apportion),
                        share,
                    );
                }
                state.counts.note_method(METHOD_SHARED_OVERRIDE);
            }
            None => match self.chain.resolve(&key, self.index) {
                Some((code, method)) => {
                    if method != "exact" {
                        log::debug!("{key} matched {code} via {method}");
                    }
                    state.aggregator.contribute(
                        &code,
                        &key,
                        StationContribution::whole(record),
                        StationShare::Whole,
                    );
                    state.counts.note_method(method);
                }
                None => self.record_miss(record, &key, state),
            },
        }
    }

    fn record_miss(&self, record: &SourceRecord, key: &CompositeKey, state: &mut ResolutionState) {
        state.counts.unresolved += 1;
        state.unmatched.record(
            key,
            UnmatchedDescriptor {
                county: key.county.clone(),
                district: key.district.clone(),
                village: key.village.clone(),
                villcode: None,
                suggested_villcode: String::new(),
                notes: self.config.unmatched_note.clone(),
            },
        );
        if self.config.keep_unresolved {
            state
                .aggregator
                .contribute_unresolved(key, StationContribution::whole(record));
        }
    }
}

/// Resolve with the configured strategy chain.
pub fn resolve(
    records: &[SourceRecord],
    index: &RegistryIndex,
    overrides: &OverrideTable,
    config: &ResolveConfig,
) -> Resolution {
    Resolver::new(config, index, overrides).resolve(records)
}
