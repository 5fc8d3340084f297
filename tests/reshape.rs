use std::str::FromStr;

use agristat::{
    detect::KeyColumns,
    metrics::MetricSelection,
    raw_table::RawTable,
    reshape::{Aggregator, ReshapePlan, SumPolicy, aggregate_table},
};
use proptest::prelude::*;
use rust_decimal::Decimal;

const HEADERS: [&str; 4] = ["State", "2018_2019_forests", "2019-2020_forests", "2018/2019_fallow"];

fn keys() -> KeyColumns {
    KeyColumns {
        region: 0,
        region_tier: "name-match",
        year: None,
    }
}

fn selection() -> MetricSelection {
    MetricSelection {
        columns: vec![1, 2, 3],
        tier: "year-tagged-keyword",
    }
}

fn build(rows: Vec<Vec<String>>) -> RawTable {
    RawTable::from_rows(HEADERS.iter().map(|h| h.to_string()).collect(), rows)
        .expect("rectangular table")
}

fn value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "-?[0-9]{1,6}(\\.[0-9]{1,3})?",
        1 => Just(String::new()),
        1 => Just("n/a".to_string()),
        1 => Just("12,5".to_string()),
    ]
}

fn row_strategy() -> impl Strategy<Value = Vec<String>> {
    (
        prop::sample::select(vec!["Assam", "Bihar", "Goa", " Goa ", ""]),
        value_strategy(),
        value_strategy(),
        value_strategy(),
    )
        .prop_map(|(region, a, b, c)| vec![region.to_string(), a, b, c])
}

fn policy_strategy() -> impl Strategy<Value = SumPolicy> {
    prop_oneof![Just(SumPolicy::ZeroFill), Just(SumPolicy::SkipInvalid)]
}

proptest! {
    #[test]
    fn row_order_never_changes_sums(
        (rows, shuffled) in prop::collection::vec(row_strategy(), 0..40)
            .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle())),
        policy in policy_strategy(),
    ) {
        let (original, _) = aggregate_table(&build(rows), &keys(), &selection(), policy).unwrap();
        let (permuted, _) = aggregate_table(&build(shuffled), &keys(), &selection(), policy).unwrap();
        prop_assert_eq!(original, permuted);
    }

    #[test]
    fn chunked_aggregation_matches_whole_table(
        rows in prop::collection::vec(row_strategy(), 0..60),
        chunk_size in 1usize..17,
        policy in policy_strategy(),
    ) {
        let table = build(rows);
        let (whole, whole_stats) = aggregate_table(&table, &keys(), &selection(), policy).unwrap();

        let plan = ReshapePlan::new(table.headers(), &keys(), &selection());
        let mut aggregator = Aggregator::new(plan, policy);
        for chunk in table.chunks(chunk_size) {
            aggregator.ingest(&chunk).unwrap();
        }
        let (chunked, chunked_stats) = aggregator.finish();
        prop_assert_eq!(
            whole.iter().collect::<Vec<_>>(),
            chunked.iter().collect::<Vec<_>>()
        );
        prop_assert_eq!(whole_stats, chunked_stats);
    }
}

#[test]
fn separator_styles_collapse_into_one_period() {
    let table = build(vec![vec![
        "Goa".to_string(),
        "1".to_string(),
        "2".to_string(),
        "4".to_string(),
    ]]);
    let (aggregate, _) = aggregate_table(&table, &keys(), &selection(), SumPolicy::ZeroFill).unwrap();
    assert_eq!(
        aggregate.iter().collect::<Vec<_>>(),
        vec![
            ("Goa", "2018_2019", Decimal::from(5)),
            ("Goa", "2019_2020", Decimal::from(2)),
        ]
    );
}

#[test]
fn zero_fill_keeps_keys_that_skip_invalid_drops() {
    let table = build(vec![vec![
        "Assam".to_string(),
        "NA".to_string(),
        "".to_string(),
        "-".to_string(),
    ]]);
    let (zero, stats) = aggregate_table(&table, &keys(), &selection(), SumPolicy::ZeroFill).unwrap();
    assert_eq!(zero.len(), 2);
    assert!(zero.iter().all(|(_, _, total)| total.is_zero()));
    assert_eq!(stats.missing_values, 3);

    let (skip, _) = aggregate_table(&table, &keys(), &selection(), SumPolicy::SkipInvalid).unwrap();
    assert!(skip.is_empty());
}

#[test]
fn decimal_sums_are_exact() {
    let table = build(vec![
        vec!["Goa".into(), "0.1".into(), "".into(), "0.2".into()],
        vec!["Goa".into(), "1e2".into(), "".into(), "".into()],
    ]);
    let (aggregate, _) = aggregate_table(&table, &keys(), &selection(), SumPolicy::SkipInvalid).unwrap();
    assert_eq!(
        aggregate.get("Goa", "2018_2019"),
        Some(Decimal::from_str("100.3").unwrap())
    );
}
