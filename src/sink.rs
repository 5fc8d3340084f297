//! Destinations for the final fact table.
//!
//! Every sink replaces its target wholesale: a re-run never appends to or
//! partially overwrites a previous result.

use std::path::PathBuf;

use anyhow::{Context, Result};
use csv::QuoteStyle;
use log::info;
use rusqlite::{Connection, params};

use crate::{
    io_utils::AtomicCsvWriter,
    reconcile::{FACT_HEADERS, FactTable},
};

pub trait FactSink {
    fn describe(&self) -> String;
    fn write(&self, facts: &FactTable) -> Result<()>;
}

/// Delimited file written through a temp file persisted over the target.
/// Fields are quoted only when they need it, so the header reads
/// `State,Year,Total_Land,Total_Crop_Production`.
pub struct CsvSink {
    path: PathBuf,
    delimiter: u8,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            path: path.into(),
            delimiter,
        }
    }
}

impl FactSink for CsvSink {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn write(&self, facts: &FactTable) -> Result<()> {
        let mut writer =
            AtomicCsvWriter::with_quote_style(&self.path, self.delimiter, QuoteStyle::Necessary)?;
        writer.write_record(FACT_HEADERS)?;
        for fact in facts.iter() {
            writer.write_record(fact.to_record())?;
        }
        let path = writer.commit()?;
        info!("Wrote {} fact row(s) to {:?}", facts.len(), path);
        Ok(())
    }
}

pub struct SqliteSink {
    path: PathBuf,
    table: String,
}

impl SqliteSink {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
        }
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl FactSink for SqliteSink {
    fn describe(&self) -> String {
        format!("sqlite:{}#{}", self.path.display(), self.table)
    }

    fn write(&self, facts: &FactTable) -> Result<()> {
        let mut conn = Connection::open(&self.path)
            .with_context(|| format!("Opening SQLite database {:?}", self.path))?;
        let table = quote_identifier(&self.table);
        let tx = conn.transaction().context("Starting SQLite transaction")?;
        tx.execute(&format!("DROP TABLE IF EXISTS {table}"), [])
            .with_context(|| format!("Dropping table {}", self.table))?;
        tx.execute(
            &format!(
                r#"
                CREATE TABLE {table} (
                    state TEXT NOT NULL,
                    year TEXT NOT NULL,
                    total_land NUMERIC NOT NULL,
                    total_crop_production NUMERIC NOT NULL,
                    PRIMARY KEY (state, year)
                );
                "#
            ),
            [],
        )
        .with_context(|| format!("Creating table {}", self.table))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (state, year, total_land, total_crop_production) VALUES (?1, ?2, ?3, ?4)"
            ))?;
            for fact in facts.iter() {
                let record = fact.to_record();
                stmt.execute(params![record[0], record[1], record[2], record[3]])
                    .with_context(|| format!("Inserting row for {} {}", fact.region, fact.year))?;
            }
        }
        tx.commit().context("Committing SQLite transaction")?;
        info!(
            "Replaced table {} in {:?} with {} row(s)",
            self.table,
            self.path,
            facts.len()
        );
        Ok(())
    }
}
