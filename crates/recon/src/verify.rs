//! Conservation check: totals recomputed straight from the source rows must
//! equal the totals of the aggregated villages.
//!
//! Shared-station truncation and resolution misses both show up as a
//! non-zero diff. A diff is reported, never raised.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{AggregatedVillage, SourceRecord, VoteCounts};
use crate::normalize::normalize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub agree: u64,
    pub disagree: u64,
    pub valid: u64,
    pub invalid: u64,
    pub total: u64,
    pub eligible_voters: u64,
    pub polling_stations: u64,
}

impl Totals {
    fn add_votes(&mut self, votes: &VoteCounts, eligible_voters: u64) {
        self.agree = self.agree.saturating_add(votes.agree);
        self.disagree = self.disagree.saturating_add(votes.disagree);
        self.valid = self.valid.saturating_add(votes.valid);
        self.invalid = self.invalid.saturating_add(votes.invalid);
        self.total = self.total.saturating_add(votes.total);
        self.eligible_voters = self.eligible_voters.saturating_add(eligible_voters);
    }

    fn add_stations(&mut self, n: u64) {
        self.polling_stations = self.polling_stations.saturating_add(n);
    }

    /// Agree share of valid votes, in percent.
    pub fn agree_rate(&self) -> f64 {
        percent(self.agree, self.valid)
    }

    /// Disagree share of valid votes, in percent.
    pub fn disagree_rate(&self) -> f64 {
        percent(self.disagree, self.valid)
    }

    pub fn turnout_rate(&self) -> f64 {
        percent(self.total, self.eligible_voters)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Grand totals over leaf rows (one polling station each).
pub fn raw_totals(records: &[SourceRecord]) -> Totals {
    let mut totals = Totals::default();
    for record in records.iter().filter(|r| r.is_leaf()) {
        totals.add_votes(&record.votes, record.eligible_voters);
        totals.add_stations(1);
    }
    totals
}

/// Grand totals over aggregated villages. `polling_stations` counts
/// contributions, so a shared station counts once per village it serves.
pub fn aggregated_totals<'a>(villages: impl IntoIterator<Item = &'a AggregatedVillage>) -> Totals {
    let mut totals = Totals::default();
    for village in villages {
        totals.add_votes(&village.total_votes, village.total_eligible_voters);
        totals.add_stations(village.polling_stations.len() as u64);
    }
    totals
}

/// Leaf-row totals per normalized county name.
pub fn county_totals(records: &[SourceRecord]) -> BTreeMap<String, Totals> {
    let mut by_county: BTreeMap<String, Totals> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_leaf()) {
        let totals = by_county.entry(normalize(&record.county)).or_default();
        totals.add_votes(&record.votes, record.eligible_voters);
        totals.add_stations(1);
    }
    by_county
}

/// `aggregated - raw`, per field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalsDiff {
    pub agree: i64,
    pub disagree: i64,
    pub valid: i64,
    pub invalid: i64,
    pub total: i64,
    pub eligible_voters: i64,
}

impl TotalsDiff {
    pub fn is_zero(&self) -> bool {
        self.nonzero_fields().is_empty()
    }

    pub fn nonzero_fields(&self) -> Vec<(&'static str, i64)> {
        [
            ("agree", self.agree),
            ("disagree", self.disagree),
            ("valid", self.valid),
            ("invalid", self.invalid),
            ("total", self.total),
            ("eligible_voters", self.eligible_voters),
        ]
        .into_iter()
        .filter(|(_, d)| *d != 0)
        .collect()
    }
}

/// Compare raw and aggregated totals. Every non-zero field is logged as a
/// warning; the caller decides what else to do with the diff.
pub fn verify_totals(raw: &Totals, aggregated: &Totals) -> TotalsDiff {
    let diff = TotalsDiff {
        agree: delta(aggregated.agree, raw.agree),
        disagree: delta(aggregated.disagree, raw.disagree),
        valid: delta(aggregated.valid, raw.valid),
        invalid: delta(aggregated.invalid, raw.invalid),
        total: delta(aggregated.total, raw.total),
        eligible_voters: delta(aggregated.eligible_voters, raw.eligible_voters),
    };

    for (field, d) in diff.nonzero_fields() {
        log::warn!("conservation: {field} differs by {d:+} (aggregated - raw)");
    }
    diff
}

/// `a - b`, clamped to the `i64` range.
pub(crate) fn delta(a: u64, b: u64) -> i64 {
    let d = i128::from(a) - i128::from(b);
    d.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}
