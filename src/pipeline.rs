//! End-to-end run: detect, reshape, reconcile, persist, report.
//!
//! Each input is scanned twice in chunks of `chunk_size` rows. The first pass
//! only builds a [`TableProfile`]; the second feeds the [`Aggregator`] and, when
//! an intermediate directory is configured, writes the header-normalized copy
//! of the input. Only the per-domain aggregates are held in memory.

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::PipelineConfig,
    detect::{KeyColumnDetector, KeyColumns, TIER_FIRST_COLUMN, TableProfile, TableProfiler},
    error::PipelineError,
    header::NormalizedHeaders,
    io_utils::{self, AtomicCsvWriter},
    metrics::{Domain, MetricSelection, MetricSelector},
    raw_table::ChunkedReader,
    reconcile::{FactTable, JOINED_HEADERS, JoinStats, JoinVariant, Reconciler, RegionFilter},
    reshape::{Aggregator, DomainAggregate, ReshapePlan, ReshapeStats, SumPolicy},
    sink::{CsvSink, FactSink, SqliteSink},
};

pub const NORMALIZED_LAND_FILE: &str = "normalized_land.csv";
pub const NORMALIZED_CROP_FILE: &str = "normalized_crop.csv";
pub const JOINED_FILE: &str = "joined.csv";

pub fn normalized_file_name(domain: Domain) -> &'static str {
    match domain {
        Domain::Land => NORMALIZED_LAND_FILE,
        Domain::Crop => NORMALIZED_CROP_FILE,
    }
}

/// What the first pass learned about one input.
#[derive(Debug, Clone)]
pub struct DomainAnalysis {
    pub domain: Domain,
    pub path: PathBuf,
    pub layout: NormalizedHeaders,
    pub profile: TableProfile,
    pub keys: KeyColumns,
    pub selection: MetricSelection,
}

impl DomainAnalysis {
    pub fn column_name(&self, idx: usize) -> &str {
        self.layout.names.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.selection
            .columns
            .iter()
            .map(|idx| self.column_name(*idx).to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainReport {
    pub domain: Domain,
    pub input: PathBuf,
    pub region_column: String,
    pub region_tier: String,
    pub year_column: Option<String>,
    pub metric_tier: String,
    pub metric_columns: Vec<String>,
    pub dropped_header_columns: Vec<String>,
    pub dropped_metric_columns: Vec<String>,
    pub aggregate_keys: usize,
    #[serde(flatten)]
    pub stats: ReshapeStats,
}

#[derive(Debug, Clone)]
pub struct DomainOutcome {
    pub aggregate: DomainAggregate,
    pub report: DomainReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub variant: JoinVariant,
    pub sum_policy: SumPolicy,
    pub region_filter: RegionFilter,
    pub chunk_size: usize,
    pub land: DomainReport,
    pub crop: DomainReport,
    pub join: JoinStats,
    pub rows_written: usize,
    pub output: PathBuf,
    pub output_sha256: String,
    pub sinks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub facts: FactTable,
    pub report: RunReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    fn open(&self, domain: Domain) -> Result<ChunkedReader> {
        let input = self.config.input(domain);
        let delimiter = input.resolved_delimiter()?;
        let encoding = input.resolved_encoding()?;
        ChunkedReader::open(&input.path, delimiter, encoding, self.config.chunk_size)
            .with_context(|| format!("Opening {domain} input {:?}", input.path))
    }

    /// Output column layout for a raw header row.
    pub fn header_layout(&self, raw: &[String]) -> NormalizedHeaders {
        if self.config.normalize_headers {
            self.config.header_normalizer().normalize(raw)
        } else {
            NormalizedHeaders {
                names: raw.to_vec(),
                source_indices: (0..raw.len()).collect(),
                dropped: Vec::new(),
            }
        }
    }

    /// First pass: profile the input and choose key and metric columns.
    pub fn analyze(&self, domain: Domain) -> Result<DomainAnalysis> {
        let path = self.config.input(domain).path.clone();
        let mut reader = self.open(domain)?;
        let layout = self.header_layout(reader.headers());
        if !layout.dropped.is_empty() {
            info!(
                "Dropping {} {domain} column(s) by pattern: {}",
                layout.dropped.len(),
                layout.dropped.iter().join(", ")
            );
        }
        if layout.names.is_empty() {
            return Err(PipelineError::NoColumns { domain }.into());
        }

        let mut profiler = TableProfiler::new(&layout.names, &self.config.detection);
        while let Some(chunk) = reader
            .next_chunk()
            .with_context(|| format!("Profiling {path:?}"))?
        {
            profiler.ingest(&chunk.project(&layout));
        }
        let profile = profiler.finish();

        let keys = KeyColumnDetector::new(&self.config.detection)
            .detect(&profile)
            .ok_or(PipelineError::NoColumns { domain })?;
        if keys.region_tier == TIER_FIRST_COLUMN {
            warn!(
                "No region column recognised in {path:?}; falling back to first column '{}'",
                layout.names[keys.region]
            );
        }
        let selection = MetricSelector::new(domain, self.config.keywords.for_domain(domain))
            .select(&profile, &keys)?;
        debug!(
            "{domain}: region '{}' ({}), year {:?}, {} metric column(s) via {}",
            layout.names[keys.region],
            keys.region_tier,
            keys.year.map(|idx| layout.names[idx].as_str()),
            selection.columns.len(),
            selection.tier
        );

        Ok(DomainAnalysis {
            domain,
            path,
            layout,
            profile,
            keys,
            selection,
        })
    }

    /// Second pass: reshape and sum, optionally writing the normalized copy.
    pub fn aggregate(&self, analysis: &DomainAnalysis) -> Result<DomainOutcome> {
        let domain = analysis.domain;
        let mut reader = self.open(domain)?;
        let plan = ReshapePlan::new(&analysis.layout.names, &analysis.keys, &analysis.selection);
        let dropped_metric_columns = plan.dropped_columns().to_vec();
        let mut aggregator = Aggregator::new(plan, self.config.sum_policy);

        let mut normalized = match &self.config.intermediate_dir {
            Some(dir) => {
                let mut writer =
                    AtomicCsvWriter::create(&dir.join(normalized_file_name(domain)), b',')?;
                writer.write_record(&analysis.layout.names)?;
                Some(writer)
            }
            None => None,
        };

        while let Some(chunk) = reader
            .next_chunk()
            .with_context(|| format!("Aggregating {:?}", analysis.path))?
        {
            let chunk = chunk.project(&analysis.layout);
            if let Some(writer) = normalized.as_mut() {
                for row in 0..chunk.row_count() {
                    writer.write_record(chunk.row(row))?;
                }
            }
            aggregator.ingest(&chunk)?;
        }
        if let Some(writer) = normalized {
            writer.commit()?;
        }

        let (aggregate, stats) = aggregator.finish();
        info!(
            "{domain}: {} row(s) -> {} (region, year) key(s); {} coercion failure(s)",
            stats.rows,
            aggregate.len(),
            stats.coercion_failures
        );
        let report = DomainReport {
            domain,
            input: analysis.path.clone(),
            region_column: analysis.column_name(analysis.keys.region).to_string(),
            region_tier: analysis.keys.region_tier.to_string(),
            year_column: analysis
                .keys
                .year
                .map(|idx| analysis.column_name(idx).to_string()),
            metric_tier: analysis.selection.tier.to_string(),
            metric_columns: analysis.metric_names(),
            dropped_header_columns: analysis.layout.dropped.clone(),
            dropped_metric_columns,
            aggregate_keys: aggregate.len(),
            stats,
        };
        Ok(DomainOutcome { aggregate, report })
    }

    pub fn process_domain(&self, domain: Domain) -> Result<DomainOutcome> {
        let analysis = self.analyze(domain)?;
        self.aggregate(&analysis)
    }

    /// The CSV output is committed last so a failing database leaves the
    /// previous fact file in place.
    fn sinks(&self) -> Vec<Box<dyn FactSink>> {
        let mut sinks: Vec<Box<dyn FactSink>> = Vec::new();
        if let Some(sqlite) = &self.config.sqlite {
            sinks.push(Box::new(SqliteSink::new(&sqlite.path, &sqlite.table)));
        }
        let output_delimiter = io_utils::resolve_input_delimiter(&self.config.output, None);
        sinks.push(Box::new(CsvSink::new(&self.config.output, output_delimiter)));
        sinks
    }

    pub fn run(&self) -> Result<RunOutcome> {
        self.config.validate()?;
        info!(
            "Running pipeline: land {:?}, crop {:?} -> {:?}",
            self.config.land.path, self.config.crop.path, self.config.output
        );
        let land = self.process_domain(Domain::Land)?;
        let crop = self.process_domain(Domain::Crop)?;

        let reconciliation = Reconciler::new(self.config.reconcile_options())
            .reconcile(&land.aggregate, &crop.aggregate)?;

        if let Some(dir) = &self.config.intermediate_dir {
            let mut writer = AtomicCsvWriter::create(&dir.join(JOINED_FILE), b',')?;
            writer.write_record(JOINED_HEADERS)?;
            for row in &reconciliation.joined {
                writer.write_record(row.to_record())?;
            }
            writer.commit()?;
        }
        if !reconciliation.stats.filtered_samples.is_empty() {
            warn!(
                "Filtered {} row(s) with malformed regions, e.g. {}",
                reconciliation.stats.filtered_regions,
                reconciliation.stats.filtered_samples.iter().join(", ")
            );
        }

        let mut sink_names = Vec::new();
        for sink in self.sinks() {
            sink.write(&reconciliation.facts)
                .with_context(|| format!("Writing facts to {}", sink.describe()))?;
            sink_names.push(sink.describe());
        }

        let report = RunReport {
            generated_at: Utc::now(),
            variant: self.config.variant,
            sum_policy: self.config.sum_policy,
            region_filter: self.config.region_filter,
            chunk_size: self.config.chunk_size,
            land: land.report,
            crop: crop.report,
            join: reconciliation.stats,
            rows_written: reconciliation.facts.len(),
            output: self.config.output.clone(),
            output_sha256: fingerprint(&self.config.output)?,
            sinks: sink_names,
        };
        if let Some(path) = &self.config.report {
            write_report(path, &report)?;
        }
        info!(
            "Pipeline complete: {} row(s) written to {:?}",
            report.rows_written, report.output
        );
        Ok(RunOutcome {
            facts: reconciliation.facts,
            report,
        })
    }
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn fingerprint(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Opening {path:?} for hashing"))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Reading {path:?} for hashing"))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
    }
    let json = serde_json::to_string_pretty(report).context("Serializing run report")?;
    let mut file = File::create(path).with_context(|| format!("Creating report {path:?}"))?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
