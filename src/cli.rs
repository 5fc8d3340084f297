use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    metrics::Domain,
    reconcile::{JoinVariant, RegionFilter},
    reshape::SumPolicy,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reshape and reconcile land-use and crop-production survey tables",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline and write the region/year fact table
    Run(RunArgs),
    /// Rewrite a table's headers into canonical `YYYY_YYYY_Label` form
    Normalize(NormalizeArgs),
    /// Show the detected key columns and selected metrics of one table
    Inspect(InspectArgs),
    /// Write the default pipeline configuration as YAML
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Land-use input, overriding the configuration
    #[arg(long)]
    pub land: Option<PathBuf>,
    /// Crop-production input, overriding the configuration
    #[arg(long)]
    pub crop: Option<PathBuf>,
    /// Final fact table path, overriding the configuration
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Keep every joined row (complete) or only rows with both measures (clean)
    #[arg(long, value_enum)]
    pub variant: Option<JoinVariant>,
    /// How unparseable metric cells take part in sums
    #[arg(long, value_enum)]
    pub sum_policy: Option<SumPolicy>,
    /// Which region values are treated as malformed after code mapping
    #[arg(long, value_enum)]
    pub region_filter: Option<RegionFilter>,
    /// Directory for normalized inputs and the raw joined table
    #[arg(long)]
    pub intermediate_dir: Option<PathBuf>,
    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Rows per chunk when scanning inputs
    #[arg(long)]
    pub chunk_size: Option<usize>,
    /// Keep only periods present in both inputs
    #[arg(long)]
    pub common_periods: bool,
    /// Suppress the summary table on stdout
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Input table
    #[arg(short, long)]
    pub input: PathBuf,
    /// Output table (`-` for stdout)
    #[arg(short, long)]
    pub output: PathBuf,
    /// Optional configuration supplying phrases and drop patterns
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Input table
    #[arg(short, long)]
    pub input: PathBuf,
    /// Which keyword list to select metrics with
    #[arg(long, value_enum)]
    pub domain: Domain,
    /// Optional configuration supplying keywords and detection settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short, long)]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
