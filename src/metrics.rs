use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{
    data,
    detect::{KeyColumns, TableProfile},
    error::PipelineError,
    header,
    strategy::{Strategy, StrategyChain},
};

pub const TIER_YEAR_TAGGED_KEYWORD: &str = "year-tagged-keyword";
pub const TIER_KEYWORD: &str = "keyword";
pub const TIER_NUMERIC_SAMPLE: &str = "numeric-sample";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "kebab-case")]
pub enum Domain {
    Land,
    Crop,
}

impl Domain {
    pub fn default_keywords(self) -> Vec<String> {
        let words: &[&str] = match self {
            Domain::Land => &[
                "reporting_area",
                "net_area_sown",
                "forest",
                "fallow",
                "culturable",
                "pasture",
                "not_available_for_cultivation",
            ],
            Domain::Crop => &["cropped_area", "production", "yield", "area_harvested"],
        };
        words.iter().map(|w| w.to_string()).collect()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Land => write!(f, "land"),
            Domain::Crop => write!(f, "crop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainKeywords {
    pub land: Vec<String>,
    pub crop: Vec<String>,
}

impl DomainKeywords {
    pub fn for_domain(&self, domain: Domain) -> &[String] {
        match domain {
            Domain::Land => &self.land,
            Domain::Crop => &self.crop,
        }
    }
}

impl Default for DomainKeywords {
    fn default() -> Self {
        Self {
            land: Domain::Land.default_keywords(),
            crop: Domain::Crop.default_keywords(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelection {
    pub columns: Vec<usize>,
    pub tier: &'static str,
}

fn matches_keyword(name: &str, keywords: &[String]) -> bool {
    let lowered = name.to_lowercase();
    keywords
        .iter()
        .any(|keyword| lowered.contains(keyword.to_lowercase().as_str()))
}

fn non_empty(columns: Vec<usize>) -> Option<Vec<usize>> {
    (!columns.is_empty()).then_some(columns)
}

pub struct YearTaggedKeyword {
    pub keywords: Vec<String>,
    pub excluded: Vec<usize>,
}

impl Strategy<TableProfile, Vec<usize>> for YearTaggedKeyword {
    fn name(&self) -> &'static str {
        TIER_YEAR_TAGGED_KEYWORD
    }

    fn apply(&self, profile: &TableProfile) -> Option<Vec<usize>> {
        non_empty(
            profile
                .columns
                .iter()
                .enumerate()
                .filter(|(idx, _)| !self.excluded.contains(idx))
                .filter(|(_, column)| {
                    header::extract_year_range(&column.name).is_some()
                        && matches_keyword(&column.name, &self.keywords)
                })
                .map(|(idx, _)| idx)
                .collect(),
        )
    }
}

pub struct AnyKeyword {
    pub keywords: Vec<String>,
    pub excluded: Vec<usize>,
}

impl Strategy<TableProfile, Vec<usize>> for AnyKeyword {
    fn name(&self) -> &'static str {
        TIER_KEYWORD
    }

    fn apply(&self, profile: &TableProfile) -> Option<Vec<usize>> {
        non_empty(
            profile
                .columns
                .iter()
                .enumerate()
                .filter(|(idx, _)| !self.excluded.contains(idx))
                .filter(|(_, column)| matches_keyword(&column.name, &self.keywords))
                .map(|(idx, _)| idx)
                .collect(),
        )
    }
}

/// Any column where at least one sampled value parses as a number.
pub struct NumericSample {
    pub excluded: Vec<usize>,
}

impl Strategy<TableProfile, Vec<usize>> for NumericSample {
    fn name(&self) -> &'static str {
        TIER_NUMERIC_SAMPLE
    }

    fn apply(&self, profile: &TableProfile) -> Option<Vec<usize>> {
        non_empty(
            (0..profile.columns.len())
                .filter(|idx| !self.excluded.contains(idx))
                .filter(|idx| {
                    profile
                        .numeric_sample(*idx)
                        .iter()
                        .any(|value| data::parse_number(value).is_some())
                })
                .collect(),
        )
    }
}

/// Picks the summable columns of one domain, degrading from precise keyword
/// matches down to "anything numeric" so that a run always has some metric.
pub struct MetricSelector {
    domain: Domain,
    keywords: Vec<String>,
}

impl MetricSelector {
    pub fn new(domain: Domain, keywords: &[String]) -> Self {
        Self {
            domain,
            keywords: keywords.to_vec(),
        }
    }

    fn chain(&self, keys: &KeyColumns) -> StrategyChain<TableProfile, Vec<usize>> {
        let excluded = std::iter::once(keys.region)
            .chain(keys.year)
            .collect::<Vec<_>>();
        StrategyChain::new()
            .then(YearTaggedKeyword {
                keywords: self.keywords.clone(),
                excluded: excluded.clone(),
            })
            .then(AnyKeyword {
                keywords: self.keywords.clone(),
                excluded: excluded.clone(),
            })
            .then(NumericSample { excluded })
    }

    pub fn select(
        &self,
        profile: &TableProfile,
        keys: &KeyColumns,
    ) -> Result<MetricSelection, PipelineError> {
        self.chain(keys)
            .resolve(profile)
            .map(|(tier, columns)| MetricSelection { columns, tier })
            .ok_or(PipelineError::EmptyMetricSelection {
                domain: self.domain,
            })
    }
}
