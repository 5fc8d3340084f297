use thiserror::Error;

use crate::metrics::Domain;

/// Domain failures that stop a run. Everything else degrades with a warning
/// and is counted in the run report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no metric columns could be selected for the {domain} table")]
    EmptyMetricSelection { domain: Domain },
    #[error("column '{column}' has {found} value(s) but the table has {expected} row(s)")]
    RaggedTable {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("the {domain} table has no columns")]
    NoColumns { domain: Domain },
    #[error("sum overflowed for region '{region}' period '{period}'")]
    SumOverflow { region: String, period: String },
}
