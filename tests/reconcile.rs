use std::collections::{BTreeMap, BTreeSet};

use agristat::{
    reconcile::{
        JoinVariant, ReconcileOptions, Reconciler, RegionCodeMap, RegionFilter, outer_join,
    },
    reshape::DomainAggregate,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn aggregate(entries: &[(&str, &str, i64)]) -> DomainAggregate {
    DomainAggregate::from_entries(
        entries
            .iter()
            .map(|(r, p, v)| ((r.to_string(), p.to_string()), Decimal::from(*v))),
    )
}

fn options(variant: JoinVariant) -> ReconcileOptions {
    ReconcileOptions {
        variant,
        region_filter: RegionFilter::Off,
        restrict_to_common_periods: false,
        region_codes: RegionCodeMap::empty(),
    }
}

fn aggregate_strategy() -> impl Strategy<Value = BTreeMap<(String, String), i64>> {
    prop::collection::btree_map(
        (
            prop::sample::select(vec!["Assam", "Bihar", "Goa", "Kerala"]),
            prop::sample::select(vec!["2017_2018", "2018_2019", "2019_2020"]),
        )
            .prop_map(|(r, p)| (r.to_string(), p.to_string())),
        -2i64..5,
        0..12,
    )
}

fn to_aggregate(map: &BTreeMap<(String, String), i64>) -> DomainAggregate {
    DomainAggregate::from_entries(map.iter().map(|(k, v)| (k.clone(), Decimal::from(*v))))
}

proptest! {
    #[test]
    fn complete_variant_has_one_row_per_key(
        land in aggregate_strategy(),
        crop in aggregate_strategy(),
    ) {
        let result = Reconciler::new(options(JoinVariant::Complete))
            .reconcile(&to_aggregate(&land), &to_aggregate(&crop))
            .unwrap();
        let expected: BTreeSet<(String, String)> = land.keys().chain(crop.keys()).cloned().collect();
        let actual = result
            .facts
            .iter()
            .map(|f| (f.region.clone(), f.year.clone()))
            .collect::<Vec<_>>();
        prop_assert_eq!(actual, expected.into_iter().collect::<Vec<_>>());
        for fact in result.facts.iter() {
            let key = (fact.region.clone(), fact.year.clone());
            prop_assert_eq!(fact.total_land, Decimal::from(land.get(&key).copied().unwrap_or(0)));
            prop_assert_eq!(
                fact.total_crop_production,
                Decimal::from(crop.get(&key).copied().unwrap_or(0))
            );
        }
    }

    #[test]
    fn clean_variant_keeps_rows_with_both_measures_nonzero(
        land in aggregate_strategy(),
        crop in aggregate_strategy(),
    ) {
        let result = Reconciler::new(options(JoinVariant::Clean))
            .reconcile(&to_aggregate(&land), &to_aggregate(&crop))
            .unwrap();
        let expected = land
            .iter()
            .filter(|(key, value)| **value != 0 && crop.get(*key).is_some_and(|c| *c != 0))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        let actual = result
            .facts
            .iter()
            .map(|f| (f.region.clone(), f.year.clone()))
            .collect::<Vec<_>>();
        prop_assert_eq!(actual, expected);
    }
}

#[test]
fn numeric_codes_resolve_and_year_fragments_are_dropped() {
    let land = aggregate(&[("4", "2018_2019", 150), ("2018_2019", "2018_2019", 9)]);
    let crop = aggregate(&[("4", "2018_2019", 30)]);
    let result = Reconciler::new(ReconcileOptions::default())
        .reconcile(&land, &crop)
        .unwrap();
    assert_eq!(result.facts.len(), 1);
    let fact = result.facts.get("Bihar", "2018_2019").expect("Bihar row");
    assert_eq!(fact.total_land, Decimal::from(150));
    assert_eq!(fact.total_crop_production, Decimal::from(30));
    assert_eq!(result.stats.filtered_regions, 1);
    assert_eq!(result.stats.remapped_regions, 1);
}

#[test]
fn any_digit_filter_is_stricter_than_year_like() {
    let land = aggregate(&[("Zone 7", "2018_2019", 1), ("Goa", "2018_2019", 1)]);
    let crop = DomainAggregate::default();
    let lenient = Reconciler::new(ReconcileOptions::default())
        .reconcile(&land, &crop)
        .unwrap();
    let strict = Reconciler::new(ReconcileOptions {
        region_filter: RegionFilter::AnyDigit,
        ..ReconcileOptions::default()
    })
    .reconcile(&land, &crop)
    .unwrap();
    assert_eq!(lenient.facts.len(), 2);
    assert_eq!(strict.facts.len(), 1);
}

#[test]
fn output_is_sorted_by_region_then_year() {
    let land = aggregate(&[("b", "2019_2020", 1), ("a", "2019_2020", 1), ("b", "2018_2019", 1)]);
    let result = Reconciler::new(options(JoinVariant::Complete))
        .reconcile(&land, &DomainAggregate::default())
        .unwrap();
    assert_eq!(
        result.facts.records(),
        vec![
            vec!["a", "2019_2020", "1", "0"],
            vec!["b", "2018_2019", "1", "0"],
            vec!["b", "2019_2020", "1", "0"],
        ]
    );
}

#[test]
fn joined_rows_keep_presence_information() {
    let land = aggregate(&[("Goa", "2018_2019", 0)]);
    let crop = aggregate(&[("Kerala", "2018_2019", 3)]);
    let (rows, stats) = outer_join(&land, &crop).unwrap();
    assert_eq!(rows[0].land, Some(Decimal::ZERO));
    assert_eq!(rows[0].crop, None);
    assert_eq!(rows[1].land, None);
    assert_eq!((stats.matched, stats.land_only, stats.crop_only), (0, 1, 1));
}
