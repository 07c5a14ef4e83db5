use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::config::{ApportionPolicy, StrategyKind};
use crate::normalize::CompositeKey;
use crate::verify::TotalsDiff;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    #[serde(default, deserialize_with = "lenient::count")]
    pub agree: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub disagree: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub valid: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub invalid: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total: u64,
}

impl VoteCounts {
    /// Per-field `floor(value / n)`. The remainder is dropped, not redistributed.
    pub fn apportion(&self, n: u64) -> Self {
        Self {
            agree: self.agree / n,
            disagree: self.disagree / n,
            valid: self.valid / n,
            invalid: self.invalid / n,
            total: self.total / n,
        }
    }
}

impl AddAssign for VoteCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.agree = self.agree.saturating_add(rhs.agree);
        self.disagree = self.disagree.saturating_add(rhs.disagree);
        self.valid = self.valid.saturating_add(rhs.valid);
        self.invalid = self.invalid.saturating_add(rhs.invalid);
        self.total = self.total.saturating_add(rhs.total);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCounts {
    #[serde(default, deserialize_with = "lenient::count")]
    pub unused: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub issued: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub remaining: u64,
}

impl BallotCounts {
    pub fn apportion(&self, n: u64) -> Self {
        Self {
            unused: self.unused / n,
            issued: self.issued / n,
            remaining: self.remaining / n,
        }
    }
}

impl AddAssign for BallotCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.unused = self.unused.saturating_add(rhs.unused);
        self.issued = self.issued.saturating_add(rhs.issued);
        self.remaining = self.remaining.saturating_add(rhs.remaining);
    }
}

/// One row of a polling-station vote report.
///
/// Rows without a village or without a polling station are district or
/// county subtotals and never reach the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default, deserialize_with = "lenient::text")]
    pub county: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub district: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub village: String,
    #[serde(default, deserialize_with = "lenient::station")]
    pub polling_station: Option<String>,
    #[serde(default)]
    pub votes: VoteCounts,
    #[serde(default)]
    pub ballots: BallotCounts,
    #[serde(default, deserialize_with = "lenient::count")]
    pub eligible_voters: u64,
    #[serde(default, deserialize_with = "lenient::rate")]
    pub turnout_rate: f64,
}

impl SourceRecord {
    /// True for a single polling station's row (not a subtotal/header row).
    pub fn is_leaf(&self) -> bool {
        !self.village.trim().is_empty() && self.polling_station.is_some()
    }
}

/// One village of the geographic registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub county: String,
    pub subdivision: String,
    pub village: String,
    pub villcode: String,
}

/// One row of the manual curation file.
///
/// `village` may name several villages joined by the configured delimiter;
/// `suggested_villcode` then lists one code per village in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    #[serde(default, deserialize_with = "lenient::text")]
    pub county: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub district: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub village: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub suggested_villcode: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub notes: String,
}

/// Pre-loaded inputs for one resolution run.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub records: Vec<SourceRecord>,
    pub registry: Vec<RegistryEntry>,
    pub overrides: Vec<OverrideEntry>,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// A polling station's contribution to one village.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationContribution {
    pub station_id: String,
    pub votes: VoteCounts,
    pub ballots: BallotCounts,
    pub eligible_voters: u64,
    pub turnout_rate: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shared_station: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_with_villages: Option<usize>,
}

impl StationContribution {
    /// The record's full counts, attributed to a single village.
    pub fn whole(record: &SourceRecord) -> Self {
        Self {
            station_id: record.polling_station.clone().unwrap_or_default(),
            votes: record.votes,
            ballots: record.ballots,
            eligible_voters: record.eligible_voters,
            turnout_rate: record.turnout_rate,
            shared_station: false,
            shared_with_villages: None,
        }
    }

    /// The record's counts as seen by one of `n` villages sharing the station.
    pub fn shared(record: &SourceRecord, n: usize, policy: ApportionPolicy) -> Self {
        let mut contribution = Self::whole(record);
        if policy == ApportionPolicy::Truncate {
            let d = n as u64;
            contribution.votes = record.votes.apportion(d);
            contribution.ballots = record.ballots.apportion(d);
            contribution.eligible_voters = record.eligible_voters / d;
        }
        contribution.shared_station = true;
        contribution.shared_with_villages = Some(n);
        contribution
    }
}

/// Finalized per-village totals. `villcode` is `None` for records that
/// could not be resolved and were kept for completeness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedVillage {
    pub villcode: Option<String>,
    pub county: String,
    pub district: String,
    pub village: String,
    pub polling_stations: Vec<StationContribution>,
    pub total_votes: VoteCounts,
    pub total_ballots: BallotCounts,
    pub total_eligible_voters: u64,
    pub station_count: f64,
    pub turnout_rate: f64,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Unresolved (county, district, village) awaiting manual curation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedDescriptor {
    #[serde(default, deserialize_with = "lenient::text")]
    pub county: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub district: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub village: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub villcode: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub suggested_villcode: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub notes: String,
}

impl UnmatchedDescriptor {
    /// Normalized composite key, so hand-edited padding does not create a
    /// second entry for the same village.
    pub fn key(&self) -> String {
        CompositeKey::new(&self.county, &self.district, &self.village).to_string()
    }
}

/// A curation entry that could not be turned into an override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideIssue {
    pub key: String,
    pub villages: Vec<String>,
    pub villcodes: Vec<String>,
}

impl std::fmt::Display for OverrideIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "override '{}': {} village name(s) {:?} do not pair with {} code(s) {:?}",
            self.key,
            self.villages.len(),
            self.villages,
            self.villcodes.len(),
            self.villcodes
        )
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionSummary {
    pub records: usize,
    pub leaf_records: usize,
    pub skipped_records: usize,
    pub resolved_records: usize,
    pub unresolved_records: usize,
    pub villages: usize,
    pub unmatched_keys: usize,
    pub override_issues: usize,
    pub method_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub engine_version: String,
    pub run_at: String,
    pub apportion: ApportionPolicy,
    pub strategies: Vec<StrategyKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ResolutionSummary,
    pub villages: BTreeMap<String, AggregatedVillage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<AggregatedVillage>,
    pub unmatched: Vec<UnmatchedDescriptor>,
    pub override_issues: Vec<OverrideIssue>,
    pub verification: TotalsDiff,
}

// ---------------------------------------------------------------------------
// Lenient field parsing
// ---------------------------------------------------------------------------

/// Spreadsheet-derived cells arrive as numbers, numeric strings, blanks or
/// junk. Anything that is not a usable value becomes zero/empty instead of
/// failing the whole document.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.map_or(0, |v| count_of(&v)))
    }

    pub fn rate<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let rate = match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(if rate.is_finite() { rate } else { 0.0 })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => number_text(&n),
            _ => String::new(),
        })
    }

    pub fn station<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(number_text(&n)),
            _ => None,
        })
    }

    fn count_of(value: &Value) -> u64 {
        match value {
            Value::Number(n) => n.as_u64().unwrap_or_else(|| from_float(n.as_f64())),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>().unwrap_or_else(|_| from_float(s.parse().ok()))
            }
            _ => 0,
        }
    }

    fn from_float(value: Option<f64>) -> u64 {
        match value {
            Some(f) if f.is_finite() && f >= 0.0 => f.trunc() as u64,
            _ => 0,
        }
    }

    /// Station numbers read from spreadsheets are often floats (`12.0`).
    fn number_text(n: &serde_json::Number) -> String {
        if let Some(i) = n.as_i64() {
            return i.to_string();
        }
        match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_parses_spreadsheet_shapes() {
        let json = r#"{
            "county": "臺北市",
            "district": "中正區",
            "village": "建國里",
            "polling_station": 12.0,
            "votes": {"agree": "100", "disagree": 50.0, "valid": null, "invalid": "-", "total": 150},
            "ballots": {"unused": 3},
            "eligible_voters": "200",
            "turnout_rate": "75.0%"
        }"#;
        let record: SourceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.polling_station.as_deref(), Some("12"));
        assert_eq!(record.votes.agree, 100);
        assert_eq!(record.votes.disagree, 50);
        assert_eq!(record.votes.valid, 0);
        assert_eq!(record.votes.invalid, 0);
        assert_eq!(record.ballots.unused, 3);
        assert_eq!(record.ballots.issued, 0);
        assert_eq!(record.eligible_voters, 200);
        assert_eq!(record.turnout_rate, 75.0);
        assert!(record.is_leaf());
    }

    #[test]
    fn summary_rows_are_not_leaves() {
        let no_station: SourceRecord =
            serde_json::from_str(r#"{"county":"A","district":"B","village":"C","polling_station":null}"#)
                .unwrap();
        assert!(!no_station.is_leaf());

        let no_village: SourceRecord =
            serde_json::from_str(r#"{"county":"A","district":"B","village":null,"polling_station":"3"}"#)
                .unwrap();
        assert_eq!(no_village.village, "");
        assert!(!no_village.is_leaf());

        let blank_station: SourceRecord =
            serde_json::from_str(r#"{"county":"A","district":"B","village":"C","polling_station":"  "}"#)
                .unwrap();
        assert!(!blank_station.is_leaf());
    }

    #[test]
    fn apportion_truncates_each_field() {
        let votes = VoteCounts { agree: 10, disagree: 7, valid: 17, invalid: 2, total: 19 };
        let share = votes.apportion(3);
        assert_eq!(share, VoteCounts { agree: 3, disagree: 2, valid: 5, invalid: 0, total: 6 });
    }

    #[test]
    fn shared_contribution_replicate_keeps_full_counts() {
        let record = SourceRecord {
            polling_station: Some("7".into()),
            votes: VoteCounts { agree: 10, ..Default::default() },
            eligible_voters: 31,
            ..Default::default()
        };
        let full = StationContribution::shared(&record, 3, ApportionPolicy::Replicate);
        assert_eq!(full.votes.agree, 10);
        assert_eq!(full.eligible_voters, 31);
        assert!(full.shared_station);

        let split = StationContribution::shared(&record, 3, ApportionPolicy::Truncate);
        assert_eq!(split.votes.agree, 3);
        assert_eq!(split.eligible_voters, 10);
        assert_eq!(split.shared_with_villages, Some(3));
    }

    #[test]
    fn unshared_contribution_omits_share_fields() {
        let record = SourceRecord { polling_station: Some("1".into()), ..Default::default() };
        let json = serde_json::to_value(StationContribution::whole(&record)).unwrap();
        assert!(json.get("shared_station").is_none());
        assert!(json.get("shared_with_villages").is_none());
    }

    #[test]
    fn counts_saturate_instead_of_overflowing() {
        let mut votes = VoteCounts { agree: u64::MAX, total: u64::MAX - 1, ..Default::default() };
        votes += VoteCounts { agree: 1, total: 5, disagree: 2, ..Default::default() };
        assert_eq!(votes.agree, u64::MAX);
        assert_eq!(votes.total, u64::MAX);
        assert_eq!(votes.disagree, 2);

        let mut ballots = BallotCounts { issued: u64::MAX, ..Default::default() };
        ballots += BallotCounts { issued: u64::MAX, unused: 1, remaining: 0 };
        assert_eq!(ballots.issued, u64::MAX);
        assert_eq!(ballots.unused, 1);
    }

    #[test]
    fn descriptor_key_ignores_padding() {
        let padded = UnmatchedDescriptor {
            county: "A ".into(),
            district: " B".into(),
            village: "\u{3000}C".into(),
            ..Default::default()
        };
        assert_eq!(padded.key(), "A|B|C");
    }
}
