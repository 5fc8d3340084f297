//! Header tokenization and normalization.
//!
//! Survey exports pack the reporting period and a hierarchy of category names
//! into a single column header, e.g.
//! `classification_of_land_..._2018_2019__hectare__..._forests`. This module
//! pulls the period out as a [`YearRange`], reduces the rest to a short
//! metric label, and maps known label fragments onto canonical category names
//! through an injectable [`PhraseTable`].
//!
//! Every function here is pure: the same header always yields the same token,
//! independent of the other columns in the table.

use std::{collections::HashSet, fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

static YEAR_RANGE: OnceLock<Regex> = OnceLock::new();
static SINGLE_YEAR: OnceLock<Regex> = OnceLock::new();

// Both patterns refuse matches glued to further digits so that `120181_2019`
// is not read as a period.
fn year_range_pattern() -> &'static Regex {
    YEAR_RANGE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])((?:19|20)\d{2})[-_/]((?:19|20)\d{2})(?:[^0-9]|$)")
            .expect("year range pattern")
    })
}

fn single_year_pattern() -> &'static Regex {
    SINGLE_YEAR.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])((?:19|20)\d{2})(?:[^0-9]|$)").expect("single year pattern")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearRange {
    pub start: u16,
    pub end: u16,
}

impl YearRange {
    /// Canonical `YYYY_YYYY` rendering used as the period key.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:04}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderToken {
    pub year_range: Option<YearRange>,
    pub metric_label: String,
}

/// Finds the first `YYYY<sep>YYYY` period in a header, `sep` being `-`, `/`
/// or `_`.
pub fn extract_year_range(name: &str) -> Option<YearRange> {
    let captures = year_range_pattern().captures(name)?;
    let start = captures.get(1)?.as_str().parse().ok()?;
    let end = captures.get(2)?.as_str().parse().ok()?;
    Some(YearRange { start, end })
}

/// Period key carried by a header: the canonical year range when present,
/// otherwise a lone plausible year such as `2018`.
pub fn extract_period(name: &str) -> Option<String> {
    if let Some(range) = extract_year_range(name) {
        return Some(range.canonical());
    }
    single_year_pattern()
        .captures(name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Normalizes a period written in a data cell or header so that `2018-2019`,
/// `2018/2019` and `2018_2019` group together.
pub fn canonical_period(value: &str) -> String {
    value.trim().replace(['-', '/'], "_")
}

/// Reduces a header to its most specific segment: the part after the last
/// `__`, with any year range removed and separators collapsed to single
/// underscores.
pub fn metric_label(name: &str) -> String {
    let segment = name.rsplit("__").next().unwrap_or(name);
    let period_span = year_range_pattern()
        .captures(segment)
        .and_then(|captures| Some((captures.get(1)?.start(), captures.get(2)?.end())));
    let without_period = match period_span {
        Some((start, end)) => {
            let mut stripped = String::with_capacity(segment.len());
            stripped.push_str(&segment[..start]);
            stripped.push(' ');
            stripped.push_str(&segment[end..]);
            stripped
        }
        None => segment.to_string(),
    };
    without_period
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub fn tokenize(name: &str) -> HeaderToken {
    HeaderToken {
        year_range: extract_year_range(name),
        metric_label: metric_label(name),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRule {
    pub phrase: String,
    pub canonical: String,
}

impl PhraseRule {
    pub fn new(phrase: &str, canonical: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            canonical: canonical.to_string(),
        }
    }
}

/// Ordered literal substitutions from raw label fragments to canonical
/// category names. Rules apply in order, each replacing every occurrence, so
/// longer phrases must precede the shorter phrases they contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhraseTable {
    rules: Vec<PhraseRule>,
}

impl PhraseTable {
    pub fn new(rules: Vec<PhraseRule>) -> Self {
        Self { rules }
    }

    pub fn apply(&self, label: &str) -> String {
        let mut output = label.to_string();
        for rule in &self.rules {
            if rule.phrase.is_empty() {
                continue;
            }
            if output.contains(rule.phrase.as_str()) {
                output = output.replace(rule.phrase.as_str(), &rule.canonical);
            }
        }
        output
    }
}

impl Default for PhraseTable {
    fn default() -> Self {
        Self::new(vec![
            PhraseRule::new("reporting_area_for_lus", "Reporting_Area"),
            PhraseRule::new(
                "land_under_misc_tree_crops_and_groves_not_included_in_net_area_sown",
                "Tree_Crop_Land",
            ),
            PhraseRule::new("area_under_non_agricultural_uses", "Non_Agricultural_Use"),
            PhraseRule::new("barren_and_unculturable_land", "Barren_Land"),
            PhraseRule::new(
                "not_available_for_cultivation_total",
                "Not_Available_For_Cultivation",
            ),
            PhraseRule::new(
                "permanent_pasture_and_other_grazing_land",
                "Pasture_Grazing_Land",
            ),
            PhraseRule::new(
                "fallow_lands_other_than_current_fallows",
                "Other_Fallow_Land",
            ),
            PhraseRule::new("culturable_waste_land", "Culturable_Waste_Land"),
            PhraseRule::new("fallow_land_total", "Fallow_Land_Total"),
            PhraseRule::new("current_fallow", "Current_Fallow"),
            PhraseRule::new("area_sown_more_than_once", "Area_Sown_More_Than_Once"),
            PhraseRule::new("net_area_sown", "Net_Area_Sown"),
            PhraseRule::new("cropped_area", "Cropped_Area"),
            PhraseRule::new("forests", "Forest_Area"),
        ])
    }
}

/// Result of normalizing a full header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedHeaders {
    /// New names, one per kept column.
    pub names: Vec<String>,
    /// Source column index for each entry of `names`.
    pub source_indices: Vec<usize>,
    /// Raw names of the columns removed by a drop pattern.
    pub dropped: Vec<String>,
}

/// Rewrites raw survey headers into `YYYY_YYYY_Canonical_Label` form.
#[derive(Debug, Clone)]
pub struct HeaderNormalizer {
    phrases: PhraseTable,
    drop_patterns: Vec<String>,
}

impl HeaderNormalizer {
    pub fn new(phrases: PhraseTable, drop_patterns: &[String]) -> Self {
        Self {
            phrases,
            drop_patterns: drop_patterns
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn normalize_name(&self, raw: &str) -> String {
        let token = tokenize(raw);
        let label = self.phrases.apply(&token.metric_label);
        let label = match label.to_ascii_lowercase().as_str() {
            "state" => "State".to_string(),
            "year" => "Year".to_string(),
            _ => label,
        };
        match (token.year_range, label.is_empty()) {
            (Some(range), false) => format!("{range}_{label}"),
            (Some(range), true) => range.canonical(),
            (None, _) => label,
        }
    }

    pub fn normalize(&self, headers: &[String]) -> NormalizedHeaders {
        let mut names = Vec::with_capacity(headers.len());
        let mut source_indices = Vec::with_capacity(headers.len());
        let mut dropped = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (idx, raw) in headers.iter().enumerate() {
            let lowered = raw.to_ascii_lowercase();
            if self
                .drop_patterns
                .iter()
                .any(|pattern| lowered.contains(pattern.as_str()))
            {
                dropped.push(raw.clone());
                continue;
            }
            let mut base = self.normalize_name(raw);
            if base.is_empty() {
                base = format!("column_{}", idx + 1);
            }
            let mut candidate = base.clone();
            let mut counter = 2usize;
            while seen.contains(&candidate) {
                candidate = format!("{base}_{counter}");
                counter += 1;
            }
            seen.insert(candidate.clone());
            names.push(candidate);
            source_indices.push(idx);
        }

        NormalizedHeaders {
            names,
            source_indices,
            dropped,
        }
    }
}
