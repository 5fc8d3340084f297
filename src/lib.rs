pub mod cli;
pub mod config;
pub mod data;
pub mod detect;
pub mod error;
pub mod header;
pub mod io_utils;
pub mod metrics;
pub mod pipeline;
pub mod raw_table;
pub mod reconcile;
pub mod reshape;
pub mod sink;
pub mod strategy;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::{InputConfig, PipelineConfig},
    metrics::Domain,
    pipeline::Pipeline,
    raw_table::ChunkedReader,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("agristat", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Normalize(args) => handle_normalize(&args),
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Loading configuration from {path:?}")),
        None => Ok(PipelineConfig::default()),
    }
}

fn handle_run(args: &cli::RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(path) = &args.land {
        config.land.path = path.clone();
    }
    if let Some(path) = &args.crop {
        config.crop.path = path.clone();
    }
    if let Some(path) = &args.output {
        config.output = path.clone();
    }
    if let Some(variant) = args.variant {
        config.variant = variant;
    }
    if let Some(policy) = args.sum_policy {
        config.sum_policy = policy;
    }
    if let Some(filter) = args.region_filter {
        config.region_filter = filter;
    }
    if let Some(dir) = &args.intermediate_dir {
        config.intermediate_dir = Some(dir.clone());
    }
    if let Some(path) = &args.report {
        config.report = Some(path.clone());
    }
    if let Some(size) = args.chunk_size {
        config.chunk_size = size;
    }
    if args.common_periods {
        config.restrict_to_common_periods = true;
    }
    debug!("Effective configuration: {config:?}");

    let outcome = Pipeline::new(config).run()?;
    if !args.quiet {
        let report = &outcome.report;
        table::print_table(
            &["domain", "region", "tier", "metrics", "rows", "skipped", "coercion_failures"]
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>(),
            &[&report.land, &report.crop]
                .iter()
                .map(|d| {
                    vec![
                        d.domain.to_string(),
                        d.region_column.clone(),
                        d.region_tier.clone(),
                        format!("{} ({})", d.metric_columns.len(), d.metric_tier),
                        d.stats.rows.to_string(),
                        d.stats.rows_without_region.to_string(),
                        d.stats.coercion_failures.to_string(),
                    ]
                })
                .collect::<Vec<_>>(),
        );
        println!();
        print!(
            "{}",
            table::render_pairs(&[
                ("matched", report.join.matched.to_string()),
                ("land_only", report.join.land_only.to_string()),
                ("crop_only", report.join.crop_only.to_string()),
                ("filtered_regions", report.join.filtered_regions.to_string()),
                ("rows_written", report.rows_written.to_string()),
                ("output", report.output.display().to_string()),
                ("sha256", report.output_sha256.clone()),
            ])
        );
    }
    Ok(())
}

fn handle_normalize(args: &cli::NormalizeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Normalizing headers of '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let mut reader = ChunkedReader::open(&args.input, delimiter, encoding, config.chunk_size)?;
    let layout = config.header_normalizer().normalize(reader.headers());
    for (raw, name) in layout
        .source_indices
        .iter()
        .map(|idx| &reader.headers()[*idx])
        .zip(&layout.names)
    {
        debug!("{raw:?} -> {name:?}");
    }

    let mut writer = io_utils::open_csv_writer(Some(args.output.as_path()), delimiter)?;
    writer
        .write_record(&layout.names)
        .context("Writing normalized headers")?;
    while let Some(chunk) = reader.next_chunk()? {
        let chunk = chunk.project(&layout);
        for row in 0..chunk.row_count() {
            writer
                .write_record(chunk.row(row))
                .context("Writing normalized row")?;
        }
    }
    writer.flush().context("Flushing normalized output")?;
    info!(
        "Wrote {} column(s) and {} row(s); dropped {} column(s)",
        layout.names.len(),
        reader.rows_read(),
        layout.dropped.len()
    );
    Ok(())
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    let input = InputConfig {
        path: args.input.clone(),
        delimiter: args.delimiter.map(|d| (d as char).to_string()),
        encoding: args.input_encoding.clone(),
    };
    match args.domain {
        Domain::Land => config.land = input,
        Domain::Crop => config.crop = input,
    }
    let analysis = Pipeline::new(config).analyze(args.domain)?;

    print!(
        "{}",
        table::render_pairs(&[
            ("domain", analysis.domain.to_string()),
            ("rows", analysis.profile.row_count.to_string()),
            (
                "region_column",
                analysis.column_name(analysis.keys.region).to_string()
            ),
            ("region_tier", analysis.keys.region_tier.to_string()),
            (
                "year_column",
                analysis
                    .keys
                    .year
                    .map(|idx| analysis.column_name(idx).to_string())
                    .unwrap_or_else(|| "(from headers)".to_string()),
            ),
            ("metric_tier", analysis.selection.tier.to_string()),
        ])
    );
    println!();
    let rows = analysis
        .layout
        .names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let role = if idx == analysis.keys.region {
                "region"
            } else if Some(idx) == analysis.keys.year {
                "year"
            } else if analysis.selection.columns.contains(&idx) {
                "metric"
            } else {
                ""
            };
            let column = &analysis.profile.columns[idx];
            vec![
                (idx + 1).to_string(),
                name.clone(),
                role.to_string(),
                column
                    .distinct_count
                    .map_or_else(|| "numeric".to_string(), |count| count.to_string()),
                column.sample.first().cloned().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(
        &["#", "column", "role", "distinct", "first_value"]
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>(),
        &rows,
    );
    Ok(())
}

fn handle_init_config(args: &cli::InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(anyhow!(
            "{:?} already exists; pass --force to overwrite",
            args.output
        ));
    }
    PipelineConfig::default()
        .save(&args.output)
        .with_context(|| format!("Writing configuration to {:?}", args.output))?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
