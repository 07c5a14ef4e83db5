use std::path::PathBuf;

use cunli_recon::compare::{compare, load_prior};
use cunli_recon::config::{ApportionPolicy, ResolveConfig};
use cunli_recon::engine::{load_records_json, run};
use cunli_recon::model::{ReconInput, ReconResult};
use cunli_recon::overrides::load_override_file;
use cunli_recon::registry;
use cunli_recon::unmatched::{load_unmatched_file, UnmatchedTracker};
use cunli_recon::verify::{county_totals, raw_totals};
use cunli_recon::CompositeKey;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read_fixture(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

fn load_input() -> ReconInput {
    ReconInput {
        records: load_records_json(&read_fixture("records.json")).unwrap(),
        registry: registry::from_geojson(&read_fixture("registry.geojson")).unwrap(),
        overrides: load_override_file(&read_fixture("manual_villcode_mapping.json")).unwrap(),
    }
}

fn load_and_run(config: &ResolveConfig) -> ReconResult {
    run(config, &load_input()).unwrap()
}

fn fixture_config() -> ResolveConfig {
    ResolveConfig::from_toml(&read_fixture("resolve.toml")).unwrap()
}

// -------------------------------------------------------------------------
// Resolution
// -------------------------------------------------------------------------

#[test]
fn fixture_summary() {
    let result = load_and_run(&fixture_config());

    assert_eq!(result.summary.records, 10);
    assert_eq!(result.summary.skipped_records, 2);
    assert_eq!(result.summary.leaf_records, 8);
    assert_eq!(result.summary.resolved_records, 6);
    assert_eq!(result.summary.unresolved_records, 2);
    assert_eq!(result.summary.villages, 6);
    assert_eq!(result.summary.unmatched_keys, 1);
    assert_eq!(result.summary.override_issues, 1);

    let methods = &result.summary.method_counts;
    assert_eq!(methods["exact"], 3);
    assert_eq!(methods["village_suffix"], 1);
    assert_eq!(methods["override"], 1);
    assert_eq!(methods["shared_override"], 1);
    assert!(!methods.contains_key("district_prefix"));
}

#[test]
fn exact_matches_fold_per_village() {
    let result = load_and_run(&fixture_config());
    let v = &result.villages["63000050001"];
    assert_eq!(v.villcode.as_deref(), Some("63000050001"));
    assert_eq!(v.total_votes.agree, 160);
    assert_eq!(v.total_votes.disagree, 90);
    assert_eq!(v.total_votes.total, 252);
    assert_eq!(v.total_ballots.unused, 98);
    assert_eq!(v.total_eligible_voters, 350);
    assert_eq!(v.station_count, 2.0);
    assert_eq!(v.turnout_rate, 72.0);
    let stations: Vec<&str> = v.polling_stations.iter().map(|s| s.station_id.as_str()).collect();
    assert_eq!(stations, vec!["1", "2"]);
}

#[test]
fn override_and_registry_share_a_village() {
    let result = load_and_run(&fixture_config());
    let v = &result.villages["63000050002"];
    assert_eq!(v.total_votes.agree, 15);
    assert_eq!(v.polling_stations.len(), 2);
    assert_eq!(v.village, "光復里");
}

#[test]
fn suffix_variant_keeps_record_spelling() {
    let result = load_and_run(&fixture_config());
    let v = &result.villages["63000050003"];
    assert_eq!(v.county, "臺北市");
    assert_eq!(v.district, "中正區");
    assert_eq!(v.village, "文北");
    assert_eq!(v.polling_stations[0].station_id, "3");
}

#[test]
fn shared_station_apportioned() {
    let result = load_and_run(&fixture_config());
    for code in ["65000010001", "65000010002", "65000010003"] {
        let v = &result.villages[code];
        assert_eq!(v.total_votes.agree, 3);
        assert_eq!(v.total_votes.disagree, 2);
        assert_eq!(v.total_votes.total, 6);
        assert_eq!(v.total_eligible_voters, 10);
        assert!((v.station_count - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(v.polling_stations[0].shared_with_villages, Some(3));
    }
}

#[test]
fn diagnostics_reported() {
    let result = load_and_run(&fixture_config());

    assert_eq!(result.override_issues.len(), 1);
    assert_eq!(result.override_issues[0].key, "新北市|板橋區|甲里、乙里");

    assert_eq!(result.unmatched.len(), 1);
    assert_eq!(result.unmatched[0].village, "不存在里");
    assert_eq!(result.unmatched[0].suggested_villcode, "");

    // One agree vote lost to truncation, three to the unmatched village.
    assert_eq!(result.verification.agree, -4);
    assert_eq!(result.verification.disagree, -4);
    assert!(!result.verification.is_zero());
}

#[test]
fn keep_unresolved_leaves_only_truncation_loss() {
    let config = ResolveConfig {
        keep_unresolved: true,
        ..fixture_config()
    };
    let result = load_and_run(&config);
    assert_eq!(result.unresolved.len(), 1);
    assert_eq!(result.unresolved[0].total_votes.agree, 3);
    assert_eq!(result.unresolved[0].station_count, 2.0);
    assert_eq!(result.verification.agree, -1);
    assert_eq!(result.verification.disagree, -1);
}

#[test]
fn replicate_policy_inflates_totals() {
    let config = ResolveConfig {
        apportion: ApportionPolicy::Replicate,
        keep_unresolved: true,
        ..fixture_config()
    };
    let result = load_and_run(&config);
    assert_eq!(result.villages["65000010002"].total_votes.agree, 10);
    assert_eq!(result.villages["65000010002"].station_count, 1.0);
    // Two extra copies of the shared station.
    assert_eq!(result.verification.agree, 20);
    assert_eq!(result.meta.apportion, ApportionPolicy::Replicate);
}

#[test]
fn csv_registry_resolves_the_same() {
    let mut input = load_input();
    input.registry = registry::from_csv(&read_fixture("registry.csv")).unwrap();
    let from_csv = run(&fixture_config(), &input).unwrap();
    let from_geojson = load_and_run(&fixture_config());
    assert_eq!(from_csv.villages, from_geojson.villages);
}

#[test]
fn result_serializes() {
    let result = load_and_run(&fixture_config());
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["meta"]["apportion"], "truncate");
    assert_eq!(json["villages"]["63000050001"]["total_votes"]["agree"], 160);
    assert!(json.get("unresolved").is_none());
    assert_eq!(json["verification"]["agree"], -4);
}

// -------------------------------------------------------------------------
// Totals
// -------------------------------------------------------------------------

#[test]
fn raw_totals_from_leaf_rows() {
    let records = load_records_json(&read_fixture("records.json")).unwrap();
    let totals = raw_totals(&records);
    assert_eq!(totals.agree, 218);
    assert_eq!(totals.disagree, 135);
    assert_eq!(totals.polling_stations, 8);

    let by_county = county_totals(&records);
    assert_eq!(by_county.len(), 2);
    assert_eq!(by_county["新北市"].agree, 10);
    assert_eq!(by_county["臺北市"].polling_stations, 7);
}

// -------------------------------------------------------------------------
// Curation + comparison
// -------------------------------------------------------------------------

#[test]
fn unmatched_merged_into_curation_file() {
    let result = load_and_run(&fixture_config());
    let mut tracker = UnmatchedTracker::new();
    for d in &result.unmatched {
        tracker.record(&CompositeKey::new(&d.county, &d.district, &d.village), d.clone());
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unmatched_for_mapping.json");
    std::fs::write(&path, read_fixture("unmatched_for_mapping.json")).unwrap();

    let existing = load_unmatched_file(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let combined = tracker.merge_into(existing);
    std::fs::write(&path, serde_json::to_string_pretty(&combined).unwrap()).unwrap();

    let reread = load_unmatched_file(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let villages: Vec<&str> = reread.iter().map(|d| d.village.as_str()).collect();
    assert_eq!(villages, vec!["待查里", "不存在里"]);

    // A second merge adds nothing.
    assert_eq!(tracker.merge_into(reread.clone()), reread);
}

#[test]
fn compare_with_prior_referendum() {
    let result = load_and_run(&fixture_config());
    let prior = load_prior(&read_fixture("prior.json"), "17").unwrap();
    assert_eq!(prior.len(), 3);

    let cmp = compare(result.villages.values(), &prior, 5);
    assert_eq!(cmp.rows.len(), 6);
    assert_eq!(cmp.summary.matched, 2);
    assert_eq!(cmp.summary.unmatched, 4);
    assert_eq!(cmp.summary.agree, 175);
    assert_eq!(cmp.summary.prior_agree, 140);

    let first = &cmp.rows[0];
    assert_eq!(first.villcode.as_deref(), Some("63000050001"));
    assert_eq!(first.diff.unwrap().agree, 40);
    assert_eq!(first.diff.unwrap().disagree, -10);

    assert_eq!(cmp.summary.top_agree_increase[0].villcode, "63000050001");
    assert_eq!(cmp.summary.top_disagree_increase[0].villcode, "63000050002");

    // The three villages of the shared station carry one label.
    assert_eq!(cmp.unmatched.len(), 2);
    assert_eq!(cmp.unmatched[0].village, "文北");
    assert_eq!(cmp.unmatched[1].village, "留侯里、西門里、赤松里");
}
