use std::collections::BTreeMap;

use crate::model::{AggregatedVillage, BallotCounts, StationContribution, VoteCounts};
use crate::normalize::CompositeKey;

/// Exact station tally: whole stations plus `1/n` shares grouped by `n`.
///
/// Kept as counts rather than a running float so the value does not depend
/// on the order contributions arrive in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationCount {
    whole: u64,
    shares: BTreeMap<usize, u64>,
}

impl StationCount {
    pub fn add(&mut self, share: StationShare) {
        match share {
            StationShare::Whole => self.whole += 1,
            StationShare::Fraction(n) => *self.shares.entry(n).or_insert(0) += 1,
        }
    }

    pub fn merge(&mut self, other: StationCount) {
        self.whole += other.whole;
        for (n, count) in other.shares {
            *self.shares.entry(n).or_insert(0) += count;
        }
    }

    pub fn value(&self) -> f64 {
        self.whole as f64
            + self
                .shares
                .iter()
                .map(|(n, count)| *count as f64 / *n as f64)
                .sum::<f64>()
    }
}

/// How much of a station one contribution represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationShare {
    Whole,
    /// One of `n` villages sharing the station.
    Fraction(usize),
}

/// Running totals for one village while records are still being folded in.
#[derive(Debug, Clone)]
pub struct VillageAccumulator {
    villcode: Option<String>,
    label: CompositeKey,
    stations: Vec<StationContribution>,
    votes: VoteCounts,
    ballots: BallotCounts,
    eligible_voters: u64,
    station_count: StationCount,
}

impl VillageAccumulator {
    fn new(villcode: Option<String>, label: CompositeKey) -> Self {
        Self {
            villcode,
            label,
            stations: Vec::new(),
            votes: VoteCounts::default(),
            ballots: BallotCounts::default(),
            eligible_voters: 0,
            station_count: StationCount::default(),
        }
    }

    fn add(
        &mut self,
        label: &CompositeKey,
        contribution: StationContribution,
        share: StationShare,
    ) {
        // Representative label is the smallest spelling seen.
        if *label < self.label {
            self.label = label.clone();
        }
        self.votes += contribution.votes;
        self.ballots += contribution.ballots;
        self.eligible_voters = self.eligible_voters.saturating_add(contribution.eligible_voters);
        self.station_count.add(share);
        self.stations.push(contribution);
    }

    fn merge(&mut self, other: VillageAccumulator) {
        if other.label < self.label {
            self.label = other.label;
        }
        self.votes += other.votes;
        self.ballots += other.ballots;
        self.eligible_voters = self.eligible_voters.saturating_add(other.eligible_voters);
        self.station_count.merge(other.station_count);
        self.stations.extend(other.stations);
    }

    fn finish(self) -> AggregatedVillage {
        let turnout_rate = if self.eligible_voters > 0 {
            self.votes.total as f64 / self.eligible_voters as f64 * 100.0
        } else {
            0.0
        };
        AggregatedVillage {
            villcode: self.villcode,
            county: self.label.county,
            district: self.label.district,
            village: self.label.village,
            polling_stations: self.stations,
            total_votes: self.votes,
            total_ballots: self.ballots,
            total_eligible_voters: self.eligible_voters,
            station_count: self.station_count.value(),
            turnout_rate,
        }
    }
}

/// Per-village accumulation for one resolution run (or one shard of it).
///
/// Resolved contributions are keyed by village code; unresolved ones, when
/// kept, by their composite key.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    villages: BTreeMap<String, VillageAccumulator>,
    unresolved: BTreeMap<CompositeKey, VillageAccumulator>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contribute(
        &mut self,
        villcode: &str,
        label: &CompositeKey,
        contribution: StationContribution,
        share: StationShare,
    ) {
        self.villages
            .entry(villcode.to_string())
            .or_insert_with(|| VillageAccumulator::new(Some(villcode.to_string()), label.clone()))
            .add(label, contribution, share);
    }

    pub fn contribute_unresolved(&mut self, key: &CompositeKey, contribution: StationContribution) {
        self.unresolved
            .entry(key.clone())
            .or_insert_with(|| VillageAccumulator::new(None, key.clone()))
            .add(key, contribution, StationShare::Whole);
    }

    /// Fold another partial aggregation in. Associative and commutative per
    /// village, apart from contribution order.
    pub fn merge(&mut self, other: Aggregator) {
        for (code, acc) in other.villages {
            match self.villages.get_mut(&code) {
                Some(existing) => existing.merge(acc),
                None => {
                    self.villages.insert(code, acc);
                }
            }
        }
        for (key, acc) in other.unresolved {
            match self.unresolved.get_mut(&key) {
                Some(existing) => existing.merge(acc),
                None => {
                    self.unresolved.insert(key, acc);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.villages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.villages.is_empty() && self.unresolved.is_empty()
    }

    /// Compute turnout and freeze. Resolved villages keyed by code,
    /// unresolved ones in composite-key order.
    pub fn finish(self) -> (BTreeMap<String, AggregatedVillage>, Vec<AggregatedVillage>) {
        let villages = self
            .villages
            .into_iter()
            .map(|(code, acc)| (code, acc.finish()))
            .collect();
        let unresolved = self.unresolved.into_values().map(VillageAccumulator::finish).collect();
        (villages, unresolved)
    }
}
