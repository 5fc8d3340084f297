//! Cell-level helpers shared by every stage: missing-value detection, numeric
//! coercion into [`Decimal`], and the stable rendering used in output files.
//!
//! Measures are summed as `Decimal` rather than `f64` so that aggregation is
//! exact; reordering or re-chunking the input can never change a total.

use std::{str::FromStr, sync::OnceLock};

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

static NUMERIC_LITERAL: OnceLock<Regex> = OnceLock::new();
static FLOAT_LITERAL: OnceLock<Regex> = OnceLock::new();

fn numeric_literal() -> &'static Regex {
    NUMERIC_LITERAL
        .get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric literal pattern"))
}

fn float_literal() -> &'static Regex {
    FLOAT_LITERAL.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("float literal pattern")
    })
}

fn is_placeholder_token(lowered: &str) -> bool {
    let stripped = lowered.trim_start_matches('#');
    matches!(
        stripped,
        "na" | "n/a" | "n.a." | "nan" | "null" | "none" | "missing"
    ) || (!stripped.is_empty() && stripped.chars().all(|c| c == '-'))
}

/// Returns true when a raw cell carries no value: empty, whitespace or a
/// placeholder such as `NA`, `#N/A` or `--`.
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    is_placeholder_token(&trimmed.to_ascii_lowercase())
}

/// Strict numeric-literal check (`-?\d+(\.\d+)?`) used by the region-column
/// heuristic. Scientific notation and thousands separators do not count.
pub fn is_numeric_literal(value: &str) -> bool {
    numeric_literal().is_match(value.trim())
}

/// Coerces a cell to a number. Missing and unparseable cells yield `None`.
///
/// Only plain float literals are accepted; digit separators (`1_000`,
/// `1,234`) and period strings such as `2018_2019` are coercion failures.
pub fn parse_number(value: &str) -> Option<Decimal> {
    if is_missing(value) {
        return None;
    }
    let trimmed = value.trim();
    if !float_literal().is_match(trimmed) {
        return None;
    }
    if let Ok(parsed) = Decimal::from_str(trimmed) {
        return Some(parsed);
    }
    if trimmed.contains(['e', 'E'])
        && let Ok(parsed) = Decimal::from_scientific(trimmed)
    {
        return Some(parsed);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Decimal::from_f64)
}

/// Renders a measure without trailing zeros: `150`, `12.5`, `0`.
pub fn format_decimal(value: Decimal) -> String {
    if value.is_zero() {
        return "0".to_string();
    }
    value.normalize().to_string()
}

/// Collapses internal whitespace runs to a single space and trims the ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
