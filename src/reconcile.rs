//! Land/crop reconciliation.
//!
//! The join follows the lookup-then-stream pattern: the crop aggregate is
//! loaded into a keyed lookup with a `matched` flag per entry, the land
//! aggregate is streamed against it, and whatever crop entries were never
//! matched are emitted last. Post-processing then maps numeric region codes,
//! filters leftover year fragments and applies the output variant.

use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use itertools::Itertools;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    data,
    error::PipelineError,
    reshape::DomainAggregate,
};

pub const FACT_HEADERS: [&str; 4] = ["State", "Year", "Total_Land", "Total_Crop_Production"];
pub const JOINED_HEADERS: [&str; 4] = FACT_HEADERS;

const FILTERED_SAMPLE_LIMIT: usize = 5;

/// Which joined rows reach the final table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum JoinVariant {
    /// Every joined row; an absent measure is written as 0.
    #[default]
    Complete,
    /// Only rows where both measures are present and nonzero.
    Clean,
}

/// Regions rejected after code mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum RegionFilter {
    /// Regions containing a run of four digits.
    #[default]
    YearLike,
    /// Regions containing any digit.
    AnyDigit,
    Off,
}

impl RegionFilter {
    pub fn rejects(self, region: &str) -> bool {
        match self {
            RegionFilter::YearLike => region
                .as_bytes()
                .windows(4)
                .any(|w| w.iter().all(u8::is_ascii_digit)),
            RegionFilter::AnyDigit => region.chars().any(|c| c.is_ascii_digit()),
            RegionFilter::Off => false,
        }
    }
}

/// Numeric region code to canonical region name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCodeMap(BTreeMap<String, String>);

impl RegionCodeMap {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn resolve<'a>(&'a self, region: &'a str) -> &'a str {
        self.0.get(region).map(String::as_str).unwrap_or(region)
    }
}

impl Default for RegionCodeMap {
    fn default() -> Self {
        const STATES: [&str; 28] = [
            "Andhra Pradesh",
            "Arunachal Pradesh",
            "Assam",
            "Bihar",
            "Chhattisgarh",
            "Goa",
            "Gujarat",
            "Haryana",
            "Himachal Pradesh",
            "Jharkhand",
            "Karnataka",
            "Kerala",
            "Madhya Pradesh",
            "Maharashtra",
            "Manipur",
            "Meghalaya",
            "Mizoram",
            "Nagaland",
            "Odisha",
            "Punjab",
            "Rajasthan",
            "Sikkim",
            "Tamil Nadu",
            "Telangana",
            "Tripura",
            "Uttar Pradesh",
            "Uttarakhand",
            "West Bengal",
        ];
        Self(
            STATES
                .iter()
                .enumerate()
                .map(|(idx, name)| ((idx + 1).to_string(), name.to_string()))
                .collect(),
        )
    }
}

pub fn normalize_region(region: &str) -> String {
    data::collapse_whitespace(region)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    pub region: String,
    pub period: String,
    pub land: Option<Decimal>,
    pub crop: Option<Decimal>,
}

impl JoinedRow {
    pub fn total_land(&self) -> Decimal {
        self.land.unwrap_or(Decimal::ZERO)
    }

    pub fn total_crop(&self) -> Decimal {
        self.crop.unwrap_or(Decimal::ZERO)
    }

    /// Both measures present and nonzero.
    pub fn is_complete(&self) -> bool {
        matches!(self.land, Some(v) if !v.is_zero()) && matches!(self.crop, Some(v) if !v.is_zero())
    }

    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.region.clone(),
            self.period.clone(),
            data::format_decimal(self.total_land()),
            data::format_decimal(self.total_crop()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub region: String,
    pub year: String,
    pub total_land: Decimal,
    pub total_crop_production: Decimal,
}

impl Fact {
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.region.clone(),
            self.year.clone(),
            data::format_decimal(self.total_land),
            data::format_decimal(self.total_crop_production),
        ]
    }
}

/// Final (region, year) table, sorted by region then year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactTable {
    facts: Vec<Fact>,
}

impl FactTable {
    /// Sorts by region then year.
    pub fn from_facts(mut facts: Vec<Fact>) -> Self {
        facts.sort_by(|a, b| (&a.region, &a.year).cmp(&(&b.region, &b.year)));
        Self { facts }
    }

    pub fn headers() -> Vec<String> {
        FACT_HEADERS.iter().map(|h| h.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fact> {
        self.facts.iter()
    }

    pub fn get(&self, region: &str, year: &str) -> Option<&Fact> {
        self.facts
            .iter()
            .find(|fact| fact.region == region && fact.year == year)
    }

    pub fn records(&self) -> Vec<Vec<String>> {
        self.facts.iter().map(Fact::to_record).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStats {
    pub matched: usize,
    pub land_only: usize,
    pub crop_only: usize,
    pub outside_common_periods: usize,
    pub remapped_regions: usize,
    pub merged_rows: usize,
    pub filtered_regions: usize,
    pub filtered_samples: Vec<String>,
    pub dropped_by_variant: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReconcileOptions {
    pub variant: JoinVariant,
    pub region_filter: RegionFilter,
    pub restrict_to_common_periods: bool,
    pub region_codes: RegionCodeMap,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Full outer join before any post-processing.
    pub joined: Vec<JoinedRow>,
    pub facts: FactTable,
    pub stats: JoinStats,
}

struct LookupEntry {
    total: Decimal,
    matched: bool,
}

fn checked_sum(
    left: Option<Decimal>,
    right: Option<Decimal>,
    region: &str,
    period: &str,
) -> Result<Option<Decimal>, PipelineError> {
    match (left, right) {
        (Some(a), Some(b)) => a
            .checked_add(b)
            .map(Some)
            .ok_or_else(|| PipelineError::SumOverflow {
                region: region.to_string(),
                period: period.to_string(),
            }),
        (a, b) => Ok(a.or(b)),
    }
}

/// Re-keys an aggregate on normalized region names, summing entries that
/// collapse onto the same key.
fn normalized_entries(
    aggregate: &DomainAggregate,
) -> Result<BTreeMap<(String, String), Decimal>, PipelineError> {
    let mut entries: BTreeMap<(String, String), Decimal> = BTreeMap::new();
    for (region, period, total) in aggregate.iter() {
        let region = normalize_region(region);
        let current = entries.get(&(region.clone(), period.to_string())).copied();
        let merged = checked_sum(current, Some(total), &region, period)?;
        if let Some(value) = merged {
            entries.insert((region, period.to_string()), value);
        }
    }
    Ok(entries)
}

/// Full outer join on (region, period). Rows come back sorted.
pub fn outer_join(
    land: &DomainAggregate,
    crop: &DomainAggregate,
) -> Result<(Vec<JoinedRow>, JoinStats), PipelineError> {
    let mut lookup: BTreeMap<(String, String), LookupEntry> = normalized_entries(crop)?
        .into_iter()
        .map(|(key, total)| {
            (
                key,
                LookupEntry {
                    total,
                    matched: false,
                },
            )
        })
        .collect();

    let mut stats = JoinStats::default();
    let mut rows = Vec::with_capacity(land.len().max(crop.len()));
    for ((region, period), total) in normalized_entries(land)? {
        let crop_total = match lookup.get_mut(&(region.clone(), period.clone())) {
            Some(entry) => {
                entry.matched = true;
                stats.matched += 1;
                Some(entry.total)
            }
            None => {
                stats.land_only += 1;
                None
            }
        };
        rows.push(JoinedRow {
            region,
            period,
            land: Some(total),
            crop: crop_total,
        });
    }

    for ((region, period), entry) in lookup {
        if entry.matched {
            continue;
        }
        stats.crop_only += 1;
        rows.push(JoinedRow {
            region,
            period,
            land: None,
            crop: Some(entry.total),
        });
    }

    rows.sort_by(|a, b| (&a.region, &a.period).cmp(&(&b.region, &b.period)));
    debug!(
        "Outer join: {} matched, {} land-only, {} crop-only",
        stats.matched, stats.land_only, stats.crop_only
    );
    Ok((rows, stats))
}

pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    pub fn reconcile(
        &self,
        land: &DomainAggregate,
        crop: &DomainAggregate,
    ) -> Result<Reconciliation, PipelineError> {
        let (joined, mut stats) = outer_join(land, crop)?;

        let common: Option<BTreeSet<&str>> = self.options.restrict_to_common_periods.then(|| {
            land.periods()
                .intersection(&crop.periods())
                .copied()
                .collect()
        });

        let mut merged: BTreeMap<(String, String), JoinedRow> = BTreeMap::new();
        let mut filtered = Vec::new();
        for row in &joined {
            if let Some(common) = &common
                && !common.contains(row.period.as_str())
            {
                stats.outside_common_periods += 1;
                continue;
            }
            let region = self.options.region_codes.resolve(&row.region).to_string();
            if region != row.region {
                stats.remapped_regions += 1;
            }
            if self.options.region_filter.rejects(&region) {
                filtered.push(region);
                continue;
            }
            let key = (region.clone(), row.period.clone());
            match merged.get_mut(&key) {
                Some(existing) => {
                    stats.merged_rows += 1;
                    existing.land = checked_sum(existing.land, row.land, &region, &row.period)?;
                    existing.crop = checked_sum(existing.crop, row.crop, &region, &row.period)?;
                }
                None => {
                    merged.insert(
                        key,
                        JoinedRow {
                            region,
                            period: row.period.clone(),
                            land: row.land,
                            crop: row.crop,
                        },
                    );
                }
            }
        }

        stats.filtered_regions = filtered.len();
        stats.filtered_samples = filtered
            .into_iter()
            .unique()
            .take(FILTERED_SAMPLE_LIMIT)
            .collect();

        let mut facts = Vec::with_capacity(merged.len());
        for row in merged.into_values() {
            if self.options.variant == JoinVariant::Clean && !row.is_complete() {
                stats.dropped_by_variant += 1;
                continue;
            }
            facts.push(Fact {
                total_land: row.total_land(),
                total_crop_production: row.total_crop(),
                region: row.region,
                year: row.period,
            });
        }

        info!(
            "Reconciled {} fact row(s) ({:?} variant); {} region(s) filtered",
            facts.len(),
            self.options.variant,
            stats.filtered_regions
        );
        Ok(Reconciliation {
            joined,
            facts: FactTable { facts },
            stats,
        })
    }
}
