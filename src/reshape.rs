//! Wide-to-long reshape and per (region, period) aggregation.
//!
//! A [`ReshapePlan`] fixes, once per table, which column holds the region,
//! where each record's period comes from, and which metric columns are
//! exploded. The [`Aggregator`] then consumes chunks of any size; because sums
//! are exact `Decimal` additions into an ordered map, the result does not
//! depend on chunk boundaries or row order.

use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    data,
    detect::KeyColumns,
    error::PipelineError,
    header,
    metrics::MetricSelection,
    raw_table::RawTable,
};

/// How missing or unparseable metric cells take part in a sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum SumPolicy {
    /// The cell contributes zero; its (region, period) key always exists.
    #[default]
    ZeroFill,
    /// The cell is excluded; a key with no valid value never appears.
    SkipInvalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRecord {
    pub region: String,
    pub period: String,
    pub value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MetricColumn {
    index: usize,
    period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReshapePlan {
    region: usize,
    year: Option<usize>,
    metrics: Vec<MetricColumn>,
    dropped: Vec<String>,
}

impl ReshapePlan {
    pub fn new(headers: &[String], keys: &KeyColumns, selection: &MetricSelection) -> Self {
        let mut metrics = Vec::with_capacity(selection.columns.len());
        let mut dropped = Vec::new();
        for &index in &selection.columns {
            let name = headers.get(index).map(String::as_str).unwrap_or("");
            let period = header::extract_period(name).map(|p| header::canonical_period(&p));
            if keys.year.is_none() && period.is_none() {
                dropped.push(name.to_string());
                continue;
            }
            metrics.push(MetricColumn { index, period });
        }
        if !dropped.is_empty() {
            warn!(
                "{} metric column(s) carry no period and no year column exists; ignoring: {:?}",
                dropped.len(),
                dropped
            );
        }
        Self {
            region: keys.region,
            year: keys.year,
            metrics,
            dropped,
        }
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Metric columns removed because no period could be attached to them.
    pub fn dropped_columns(&self) -> &[String] {
        &self.dropped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshapeStats {
    pub rows: usize,
    pub rows_without_region: usize,
    pub records: usize,
    pub records_without_period: usize,
    pub missing_values: usize,
    pub coercion_failures: usize,
}

/// Explodes one chunk into long records, updating `stats` with every row or
/// cell that could not be used as-is.
pub fn explode(chunk: &RawTable, plan: &ReshapePlan, stats: &mut ReshapeStats) -> Vec<LongRecord> {
    let mut records = Vec::with_capacity(chunk.row_count() * plan.metrics.len());
    for row in 0..chunk.row_count() {
        stats.rows += 1;
        let raw_region = chunk.cell(plan.region, row);
        if data::is_missing(raw_region) {
            stats.rows_without_region += 1;
            continue;
        }
        let region = data::collapse_whitespace(raw_region);
        let row_period = plan
            .year
            .map(|idx| chunk.cell(idx, row))
            .filter(|cell| !data::is_missing(cell))
            .map(header::canonical_period);

        for metric in &plan.metrics {
            let period = match row_period.as_ref().or(metric.period.as_ref()) {
                Some(period) => period.clone(),
                None => {
                    stats.records_without_period += 1;
                    continue;
                }
            };
            let cell = chunk.cell(metric.index, row);
            let value = data::parse_number(cell);
            if value.is_none() {
                if data::is_missing(cell) {
                    stats.missing_values += 1;
                } else {
                    stats.coercion_failures += 1;
                }
            }
            stats.records += 1;
            records.push(LongRecord {
                region: region.clone(),
                period,
                value,
            });
        }
    }
    records
}

/// Per (region, period) totals of one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAggregate {
    totals: BTreeMap<(String, String), Decimal>,
}

impl DomainAggregate {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ((String, String), Decimal)>,
    {
        Self {
            totals: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn get(&self, region: &str, period: &str) -> Option<Decimal> {
        self.totals
            .get(&(region.to_string(), period.to_string()))
            .copied()
    }

    /// Entries in (region, period) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, Decimal)> {
        self.totals
            .iter()
            .map(|((region, period), total)| (region.as_str(), period.as_str(), *total))
    }

    pub fn periods(&self) -> BTreeSet<&str> {
        self.totals.keys().map(|(_, period)| period.as_str()).collect()
    }
}

pub struct Aggregator {
    plan: ReshapePlan,
    policy: SumPolicy,
    totals: BTreeMap<(String, String), Decimal>,
    stats: ReshapeStats,
}

impl Aggregator {
    pub fn new(plan: ReshapePlan, policy: SumPolicy) -> Self {
        Self {
            plan,
            policy,
            totals: BTreeMap::new(),
            stats: ReshapeStats::default(),
        }
    }

    pub fn plan(&self) -> &ReshapePlan {
        &self.plan
    }

    pub fn ingest(&mut self, chunk: &RawTable) -> Result<(), PipelineError> {
        let records = explode(chunk, &self.plan, &mut self.stats);
        self.ingest_records(records)
    }

    pub fn ingest_records<I>(&mut self, records: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = LongRecord>,
    {
        for record in records {
            let contribution = match (record.value, self.policy) {
                (Some(value), _) => value,
                (None, SumPolicy::ZeroFill) => Decimal::ZERO,
                (None, SumPolicy::SkipInvalid) => continue,
            };
            let key = (record.region, record.period);
            let total = self.totals.entry(key.clone()).or_insert(Decimal::ZERO);
            *total = total
                .checked_add(contribution)
                .ok_or_else(|| PipelineError::SumOverflow {
                    region: key.0,
                    period: key.1,
                })?;
        }
        Ok(())
    }

    pub fn finish(self) -> (DomainAggregate, ReshapeStats) {
        (DomainAggregate { totals: self.totals }, self.stats)
    }
}

/// Whole-table convenience over [`Aggregator`].
pub fn aggregate_table(
    table: &RawTable,
    keys: &KeyColumns,
    selection: &MetricSelection,
    policy: SumPolicy,
) -> Result<(DomainAggregate, ReshapeStats), PipelineError> {
    let plan = ReshapePlan::new(table.headers(), keys, selection);
    let mut aggregator = Aggregator::new(plan, policy);
    aggregator.ingest(table)?;
    Ok(aggregator.finish())
}
