//! Comparison of resolved villages against an earlier referendum keyed by
//! the same village codes.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ReconError;
use crate::model::{AggregatedVillage, UnmatchedDescriptor};
use crate::normalize::CompositeKey;
use crate::unmatched::UnmatchedTracker;
use crate::verify::delta;

pub const MISSING_PRIOR_NOTE: &str = "Missing in prior dataset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorTally {
    pub agree: u64,
    pub disagree: u64,
}

/// Read prior results: a JSON object keyed by village code whose values
/// carry `{case}_agree` and `{case}_disagree`. Codes missing either field
/// (or with non-numeric values) are left out.
pub fn load_prior(input: &str, case: &str) -> Result<HashMap<String, PriorTally>, ReconError> {
    let doc: serde_json::Map<String, Value> =
        serde_json::from_str(input).map_err(|e| ReconError::json("prior results", e))?;

    let agree_field = format!("{case}_agree");
    let disagree_field = format!("{case}_disagree");

    let prior = doc
        .into_iter()
        .filter_map(|(code, village)| {
            let agree = village.get(&agree_field).and_then(as_count)?;
            let disagree = village.get(&disagree_field).and_then(as_count)?;
            Some((code, PriorTally { agree, disagree }))
        })
        .collect();
    Ok(prior)
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoteChange {
    pub agree: i64,
    pub disagree: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PctChange {
    pub agree: f64,
    pub disagree: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub villcode: Option<String>,
    pub county: String,
    pub district: String,
    pub village: String,
    pub agree: u64,
    pub disagree: u64,
    pub prior_agree: Option<u64>,
    pub prior_disagree: Option<u64>,
    pub diff: Option<VoteChange>,
    pub pct_change: Option<PctChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedChange {
    pub villcode: String,
    pub county: String,
    pub district: String,
    pub village: String,
    pub current: u64,
    pub prior: u64,
    pub diff: i64,
    pub pct_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub villages: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub match_rate: f64,
    /// Totals over matched villages only.
    pub agree: u64,
    pub disagree: u64,
    pub prior_agree: u64,
    pub prior_disagree: u64,
    pub top_agree_increase: Vec<RankedChange>,
    pub top_disagree_increase: Vec<RankedChange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub rows: Vec<ComparisonRow>,
    pub unmatched: Vec<UnmatchedDescriptor>,
    pub summary: ComparisonSummary,
}

/// `(new - old) / old * 100`, or 0 when there is no base.
pub fn pct_change(new: u64, old: u64) -> f64 {
    if old == 0 {
        0.0
    } else {
        (new as f64 - old as f64) / old as f64 * 100.0
    }
}

/// Compare each village with its prior result. Villages without a prior
/// (or without a code) become curation descriptors, one per composite key.
pub fn compare<'a>(
    villages: impl IntoIterator<Item = &'a AggregatedVillage>,
    prior: &HashMap<String, PriorTally>,
    top_n: usize,
) -> Comparison {
    let mut rows = Vec::new();
    let mut tracker = UnmatchedTracker::new();

    for v in villages {
        let agree = v.total_votes.agree;
        let disagree = v.total_votes.disagree;
        let mut row = ComparisonRow {
            villcode: v.villcode.clone(),
            county: v.county.clone(),
            district: v.district.clone(),
            village: v.village.clone(),
            agree,
            disagree,
            prior_agree: None,
            prior_disagree: None,
            diff: None,
            pct_change: None,
        };

        match v.villcode.as_ref().and_then(|code| prior.get(code)) {
            Some(p) => {
                row.prior_agree = Some(p.agree);
                row.prior_disagree = Some(p.disagree);
                row.diff = Some(VoteChange {
                    agree: delta(agree, p.agree),
                    disagree: delta(disagree, p.disagree),
                });
                row.pct_change = Some(PctChange {
                    agree: pct_change(agree, p.agree),
                    disagree: pct_change(disagree, p.disagree),
                });
            }
            None => {
                let key = CompositeKey::new(&v.county, &v.district, &v.village);
                tracker.record(
                    &key,
                    UnmatchedDescriptor {
                        county: key.county.clone(),
                        district: key.district.clone(),
                        village: key.village.clone(),
                        villcode: v.villcode.clone(),
                        suggested_villcode: String::new(),
                        notes: MISSING_PRIOR_NOTE.into(),
                    },
                );
            }
        }
        rows.push(row);
    }

    let summary = summarize(&rows, top_n);
    log::info!(
        "comparison: {} of {} villages have prior results",
        summary.matched,
        summary.villages
    );

    Comparison {
        rows,
        unmatched: tracker.into_entries(),
        summary,
    }
}

fn summarize(rows: &[ComparisonRow], top_n: usize) -> ComparisonSummary {
    let matched: Vec<&ComparisonRow> = rows.iter().filter(|r| r.diff.is_some()).collect();

    let match_rate = if rows.is_empty() {
        0.0
    } else {
        matched.len() as f64 / rows.len() as f64 * 100.0
    };

    ComparisonSummary {
        villages: rows.len(),
        matched: matched.len(),
        unmatched: rows.len() - matched.len(),
        match_rate,
        agree: saturating_sum(matched.iter().map(|r| r.agree)),
        disagree: saturating_sum(matched.iter().map(|r| r.disagree)),
        prior_agree: saturating_sum(matched.iter().filter_map(|r| r.prior_agree)),
        prior_disagree: saturating_sum(matched.iter().filter_map(|r| r.prior_disagree)),
        top_agree_increase: top_changes(&matched, top_n, |r| (r.agree, r.prior_agree)),
        top_disagree_increase: top_changes(&matched, top_n, |r| (r.disagree, r.prior_disagree)),
    }
}

fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

/// Largest increases first; ties broken by village code.
fn top_changes(
    matched: &[&ComparisonRow],
    top_n: usize,
    pick: impl Fn(&ComparisonRow) -> (u64, Option<u64>),
) -> Vec<RankedChange> {
    let mut ranked: Vec<RankedChange> = matched
        .iter()
        .filter_map(|r| {
            let (current, prior) = pick(*r);
            let prior = prior?;
            Some(RankedChange {
                villcode: r.villcode.clone()?,
                county: r.county.clone(),
                district: r.district.clone(),
                village: r.village.clone(),
                current,
                prior,
                diff: delta(current, prior),
                pct_change: pct_change(current, prior),
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.diff.cmp(&a.diff).then_with(|| a.villcode.cmp(&b.villcode)));
    ranked.truncate(top_n);
    ranked
}
