//! Region/year key-column detection.
//!
//! Detection runs on a [`TableProfile`], a bounded summary of a table built
//! incrementally from chunks, so a file never has to be held in memory to
//! find its keys. The region column is chosen by a [`StrategyChain`]:
//!
//! 1. `name-match`: header equals or contains a known region label;
//! 2. `distinct-text`: mostly non-numeric values with a plausible number of
//!    distinct labels;
//! 3. `first-column`: last resort, reported as a schema ambiguity.
//!
//! The year column is a plain case-insensitive `year` header; without one the
//! table runs in year-in-header mode.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    data,
    raw_table::RawTable,
    strategy::{Strategy, StrategyChain},
};

pub const TIER_NAME_MATCH: &str = "name-match";
pub const TIER_DISTINCT_TEXT: &str = "distinct-text";
pub const TIER_FIRST_COLUMN: &str = "first-column";

const TEXT_FRACTION_THRESHOLD: f64 = 0.6;
const MIN_DISTINCT_CEILING: f64 = 500.0;

pub fn default_region_candidates() -> Vec<String> {
    ["state", "state_name", "st_name", "state/ut", "state_ut", "region", "name"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DetectionSettings {
    /// Non-missing values sampled per column for the text heuristic.
    pub sample_values: usize,
    /// Non-missing values sampled per column for the numeric fallback.
    pub numeric_sample: usize,
    /// Region header labels in priority order.
    pub region_candidates: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            sample_values: 200,
            numeric_sample: 50,
            region_candidates: default_region_candidates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    /// Leading non-missing values, trimmed, in row order.
    pub sample: Vec<String>,
    /// `None` once the text sample showed the column is mostly numeric; such
    /// a column is never a region candidate, so its values stop being tracked.
    pub distinct_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableProfile {
    pub columns: Vec<ColumnProfile>,
    pub row_count: usize,
    pub sample_values: usize,
    pub numeric_sample: usize,
}

impl TableProfile {
    pub fn from_table(table: &RawTable, settings: &DetectionSettings) -> Self {
        let mut profiler = TableProfiler::new(table.headers(), settings);
        profiler.ingest(table);
        profiler.finish()
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn text_sample(&self, column: usize) -> &[String] {
        let sample = &self.columns[column].sample;
        &sample[..sample.len().min(self.sample_values)]
    }

    pub fn numeric_sample(&self, column: usize) -> &[String] {
        let sample = &self.columns[column].sample;
        &sample[..sample.len().min(self.numeric_sample)]
    }

    /// Fraction of the text sample that is not a plain numeric literal.
    pub fn non_numeric_fraction(&self, column: usize) -> f64 {
        text_fraction(self.text_sample(column))
    }
}

fn text_fraction(sample: &[String]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let textual = sample
        .iter()
        .filter(|value| !data::is_numeric_literal(value))
        .count();
    textual as f64 / sample.len() as f64
}

/// Accumulates a [`TableProfile`] chunk by chunk.
///
/// Memory is bounded by the samples plus the distinct sets of text-like
/// columns: a column whose full text sample is mostly numeric drops its set.
pub struct TableProfiler {
    names: Vec<String>,
    samples: Vec<Vec<String>>,
    distinct: Vec<Option<HashSet<String>>>,
    sample_cap: usize,
    sample_values: usize,
    numeric_sample: usize,
    row_count: usize,
}

impl TableProfiler {
    pub fn new(headers: &[String], settings: &DetectionSettings) -> Self {
        Self {
            names: headers.to_vec(),
            samples: vec![Vec::new(); headers.len()],
            distinct: vec![Some(HashSet::new()); headers.len()],
            sample_cap: settings.sample_values.max(settings.numeric_sample),
            sample_values: settings.sample_values,
            numeric_sample: settings.numeric_sample,
            row_count: 0,
        }
    }

    pub fn ingest(&mut self, chunk: &RawTable) {
        for column in 0..self.names.len().min(chunk.column_count()) {
            for value in chunk.column(column) {
                if data::is_missing(value) {
                    continue;
                }
                let trimmed = value.trim();
                let sample = &mut self.samples[column];
                if sample.len() < self.sample_cap {
                    sample.push(trimmed.to_string());
                    if sample.len() == self.sample_values
                        && text_fraction(sample) <= TEXT_FRACTION_THRESHOLD
                    {
                        self.distinct[column] = None;
                    }
                }
                if let Some(distinct) = &mut self.distinct[column]
                    && !distinct.contains(trimmed)
                {
                    distinct.insert(trimmed.to_string());
                }
            }
        }
        self.row_count += chunk.row_count();
    }

    pub fn finish(self) -> TableProfile {
        let columns = self
            .names
            .into_iter()
            .zip(self.samples)
            .zip(self.distinct)
            .map(|((name, sample), distinct)| ColumnProfile {
                name,
                sample,
                distinct_count: distinct.map(|set| set.len()),
            })
            .collect();
        TableProfile {
            columns,
            row_count: self.row_count,
            sample_values: self.sample_values,
            numeric_sample: self.numeric_sample,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumns {
    pub region: usize,
    pub region_tier: &'static str,
    pub year: Option<usize>,
}

pub fn find_year_column<S: AsRef<str>>(headers: &[S]) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.as_ref().trim().eq_ignore_ascii_case("year"))
}

/// Candidate labels in priority order; within one label, table order.
pub struct NameMatch {
    pub candidates: Vec<String>,
}

impl Strategy<TableProfile, usize> for NameMatch {
    fn name(&self) -> &'static str {
        TIER_NAME_MATCH
    }

    fn apply(&self, profile: &TableProfile) -> Option<usize> {
        let lowered = profile
            .columns
            .iter()
            .map(|c| c.name.to_lowercase())
            .collect::<Vec<_>>();
        self.candidates.iter().find_map(|candidate| {
            let candidate = candidate.to_lowercase();
            lowered
                .iter()
                .position(|name| name == &candidate || name.contains(candidate.as_str()))
        })
    }
}

/// Mostly-text column with the richest set of distinct labels.
pub struct DistinctText {
    pub exclude: Option<usize>,
}

impl Strategy<TableProfile, usize> for DistinctText {
    fn name(&self) -> &'static str {
        TIER_DISTINCT_TEXT
    }

    fn apply(&self, profile: &TableProfile) -> Option<usize> {
        let ceiling = MIN_DISTINCT_CEILING.max(profile.row_count as f64 / 2.0);
        let mut best: Option<(usize, usize)> = None;
        for (idx, column) in profile.columns.iter().enumerate() {
            if Some(idx) == self.exclude {
                continue;
            }
            let Some(distinct) = column.distinct_count else {
                continue;
            };
            let qualifies = profile.non_numeric_fraction(idx) > TEXT_FRACTION_THRESHOLD
                && distinct > 2
                && (distinct as f64) < ceiling;
            if !qualifies {
                continue;
            }
            if best.is_none_or(|(_, top)| distinct > top) {
                best = Some((idx, distinct));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

pub struct FirstColumn;

impl Strategy<TableProfile, usize> for FirstColumn {
    fn name(&self) -> &'static str {
        TIER_FIRST_COLUMN
    }

    fn apply(&self, profile: &TableProfile) -> Option<usize> {
        (!profile.columns.is_empty()).then_some(0)
    }
}

pub struct KeyColumnDetector {
    candidates: Vec<String>,
}

impl KeyColumnDetector {
    pub fn new(settings: &DetectionSettings) -> Self {
        Self {
            candidates: settings.region_candidates.clone(),
        }
    }

    fn region_chain(&self, year: Option<usize>) -> StrategyChain<TableProfile, usize> {
        StrategyChain::new()
            .then(NameMatch {
                candidates: self.candidates.clone(),
            })
            .then(DistinctText { exclude: year })
            .then(FirstColumn)
    }

    /// Returns `None` only for a table without columns.
    pub fn detect(&self, profile: &TableProfile) -> Option<KeyColumns> {
        let headers = profile.headers();
        let year = find_year_column(headers.as_slice());
        let (tier, region) = self.region_chain(year).resolve(profile)?;
        Some(KeyColumns {
            region,
            region_tier: tier,
            year: year.filter(|idx| *idx != region),
        })
    }
}
