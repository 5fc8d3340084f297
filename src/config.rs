//! Pipeline configuration.
//!
//! Everything the heuristics consult (keyword lists, phrase table, region
//! candidates, the code map) lives here as data with defaults, so a YAML file
//! only needs to name what differs from the defaults.

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    cli,
    detect::DetectionSettings,
    header::{HeaderNormalizer, PhraseTable},
    io_utils,
    metrics::{Domain, DomainKeywords},
    reconcile::{JoinVariant, ReconcileOptions, RegionCodeMap, RegionFilter},
    reshape::SumPolicy,
};

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_SQLITE_TABLE: &str = "land_crop_facts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct InputConfig {
    pub path: PathBuf,
    /// Single character or one of `tab`, `comma`, `pipe`, `semicolon`.
    /// Resolved from the file extension when absent.
    pub delimiter: Option<String>,
    /// `encoding_rs` label; UTF-8 when absent.
    pub encoding: Option<String>,
}

impl InputConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: None,
            encoding: None,
        }
    }

    pub fn resolved_delimiter(&self) -> Result<u8> {
        let provided = self
            .delimiter
            .as_deref()
            .map(cli::parse_delimiter)
            .transpose()
            .map_err(|err| anyhow!("Invalid delimiter for {:?}: {err}", self.path))?;
        Ok(io_utils::resolve_input_delimiter(&self.path, provided))
    }

    pub fn resolved_encoding(&self) -> Result<&'static Encoding> {
        io_utils::resolve_encoding(self.encoding.as_deref())
            .with_context(|| format!("Resolving encoding for {:?}", self.path))
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self::at("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub table: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("land_crop.db"),
            table: DEFAULT_SQLITE_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PipelineConfig {
    pub land: InputConfig,
    pub crop: InputConfig,
    pub output: PathBuf,
    pub intermediate_dir: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub chunk_size: usize,
    pub variant: JoinVariant,
    pub region_filter: RegionFilter,
    pub sum_policy: SumPolicy,
    pub restrict_to_common_periods: bool,
    pub normalize_headers: bool,
    pub drop_column_patterns: Vec<String>,
    pub keywords: DomainKeywords,
    pub phrases: PhraseTable,
    pub detection: DetectionSettings,
    pub region_codes: RegionCodeMap,
    pub sqlite: Option<SqliteConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            land: InputConfig::at("land.csv"),
            crop: InputConfig::at("crop.csv"),
            output: PathBuf::from("final_land_crop.csv"),
            intermediate_dir: None,
            report: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            variant: JoinVariant::default(),
            region_filter: RegionFilter::default(),
            sum_policy: SumPolicy::default(),
            restrict_to_common_periods: false,
            normalize_headers: true,
            drop_column_patterns: vec!["district".to_string()],
            keywords: DomainKeywords::default(),
            phrases: PhraseTable::default(),
            detection: DetectionSettings::default(),
            region_codes: RegionCodeMap::default(),
            sqlite: None,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading config file {path:?}"))?;
        let config: PipelineConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_yaml::to_string(self).context("Serializing configuration")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating directory {parent:?}"))?;
        }
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be at least 1"));
        }
        if self.detection.sample_values == 0 || self.detection.numeric_sample == 0 {
            return Err(anyhow!("detection sample sizes must be at least 1"));
        }
        if let Some(sqlite) = &self.sqlite
            && sqlite.table.trim().is_empty()
        {
            return Err(anyhow!("sqlite.table cannot be empty"));
        }
        Ok(())
    }

    pub fn input(&self, domain: Domain) -> &InputConfig {
        match domain {
            Domain::Land => &self.land,
            Domain::Crop => &self.crop,
        }
    }

    pub fn header_normalizer(&self) -> HeaderNormalizer {
        HeaderNormalizer::new(self.phrases.clone(), &self.drop_column_patterns)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            variant: self.variant,
            region_filter: self.region_filter,
            restrict_to_common_periods: self.restrict_to_common_periods,
            region_codes: self.region_codes.clone(),
        }
    }
}
