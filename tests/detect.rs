use agristat::{
    detect::{
        DetectionSettings, KeyColumnDetector, TIER_DISTINCT_TEXT, TIER_NAME_MATCH, TableProfile,
        TableProfiler,
    },
    metrics::{Domain, MetricSelector, TIER_KEYWORD},
    raw_table::RawTable,
};
use proptest::prelude::*;

fn table(headers: &[&str], rows: &[Vec<String>]) -> RawTable {
    RawTable::from_rows(headers.iter().map(|h| h.to_string()).collect(), rows.to_vec())
        .expect("rectangular table")
}

fn cell_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Z][a-z]{2,8}",
        "-?[0-9]{1,4}(\\.[0-9]{1,2})?",
        Just(String::new()),
        Just("NA".to_string()),
    ]
}

proptest! {
    #[test]
    fn detection_is_deterministic(
        rows in prop::collection::vec(prop::collection::vec(cell_strategy(), 4), 1..40)
    ) {
        let t = table(&["c1", "c2", "c3", "year"], &rows);
        let settings = DetectionSettings::default();
        let detector = KeyColumnDetector::new(&settings);
        let first = detector.detect(&TableProfile::from_table(&t, &settings));
        let second = detector.detect(&TableProfile::from_table(&t, &settings));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn chunked_profile_matches_whole_profile(
        rows in prop::collection::vec(prop::collection::vec(cell_strategy(), 3), 1..60),
        chunk in 1usize..9,
    ) {
        let t = table(&["a", "b", "c"], &rows);
        let settings = DetectionSettings::default();
        let mut profiler = TableProfiler::new(t.headers(), &settings);
        for part in t.chunks(chunk) {
            profiler.ingest(&part);
        }
        prop_assert_eq!(profiler.finish(), TableProfile::from_table(&t, &settings));
    }
}

#[test]
fn candidate_priority_beats_column_order() {
    let rows = vec![vec!["x".to_string(), "Goa".to_string(), "1".to_string()]];
    let t = table(&["Region", "State_Name", "v"], &rows);
    let settings = DetectionSettings::default();
    let keys = KeyColumnDetector::new(&settings)
        .detect(&TableProfile::from_table(&t, &settings))
        .expect("keys");
    // `state` precedes `region` in the candidate list.
    assert_eq!(keys.region, 1);
    assert_eq!(keys.region_tier, TIER_NAME_MATCH);
}

#[test]
fn year_column_is_never_the_text_heuristic_pick() {
    let rows = ["Assam", "Bihar", "Goa", "Kerala"]
        .iter()
        .zip(["2018-19", "2019-20", "2020-21", "2021-22"])
        .map(|(r, y)| vec![r.to_string(), y.to_string(), "5".to_string()])
        .collect::<Vec<_>>();
    let t = table(&["label", "Year", "v"], &rows);
    let settings = DetectionSettings::default();
    let keys = KeyColumnDetector::new(&settings)
        .detect(&TableProfile::from_table(&t, &settings))
        .expect("keys");
    assert_eq!(keys.region, 0);
    assert_eq!(keys.region_tier, TIER_DISTINCT_TEXT);
    assert_eq!(keys.year, Some(1));
}

#[test]
fn keyword_tier_applies_without_year_tags() {
    let rows = vec![vec!["Goa".to_string(), "2019".to_string(), "12".to_string()]];
    let t = table(&["State", "Year", "Rice_Production"], &rows);
    let settings = DetectionSettings::default();
    let profile = TableProfile::from_table(&t, &settings);
    let keys = KeyColumnDetector::new(&settings).detect(&profile).expect("keys");
    let selection = MetricSelector::new(Domain::Crop, &Domain::Crop.default_keywords())
        .select(&profile, &keys)
        .expect("selection");
    assert_eq!(selection.columns, vec![2]);
    assert_eq!(selection.tier, TIER_KEYWORD);
}
