//! I/O utilities for CSV reading, writing, encoding, and delimiter resolution.
//!
//! All file I/O in agristat flows through this module:
//!
//! - **Delimiter resolution**: extension-based detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: survey exports are frequently Windows-1252 or Latin-1; input
//!   bytes are decoded through `encoding_rs`, defaulting to UTF-8. Output is
//!   always UTF-8.
//! - **Atomic output**: [`AtomicCsvWriter`] writes into a temp file beside the
//!   target and only replaces the target on [`AtomicCsvWriter::commit`], so a
//!   failed run never leaves a half-written file behind.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use tempfile::NamedTempFile;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    let decoded = decode_record(&headers, encoding)?;
    // Excel exports often lead with a byte-order mark.
    Ok(decoded
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            if idx == 0 {
                name.trim_start_matches('\u{feff}').to_string()
            } else {
                name
            }
        })
        .collect())
}

fn writer_builder(delimiter: u8, quote_style: QuoteStyle) -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(quote_style)
        .double_quote(true);
    builder
}

/// Opens a plain writer on stdout (for `-`) or directly on a file.
pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    Ok(writer_builder(delimiter, QuoteStyle::Always).from_writer(base))
}

/// CSV writer whose target only appears once every row has been written.
pub struct AtomicCsvWriter {
    target: PathBuf,
    writer: csv::Writer<BufWriter<NamedTempFile>>,
}

impl AtomicCsvWriter {
    /// Quotes every field.
    pub fn create(target: &Path, delimiter: u8) -> Result<Self> {
        Self::with_quote_style(target, delimiter, QuoteStyle::Always)
    }

    pub fn with_quote_style(
        target: &Path,
        delimiter: u8,
        quote_style: QuoteStyle,
    ) -> Result<Self> {
        let parent = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Creating output directory {parent:?}"))?;
        let temp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Creating temp file in {parent:?}"))?;
        Ok(Self {
            target: target.to_path_buf(),
            writer: writer_builder(delimiter, quote_style).from_writer(BufWriter::new(temp)),
        })
    }

    pub fn write_record<I, T>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(record)
            .with_context(|| format!("Writing row to {:?}", self.target))
    }

    /// Flushes and moves the temp file over the target.
    pub fn commit(self) -> Result<PathBuf> {
        let target = self.target;
        let buffered = self
            .writer
            .into_inner()
            .map_err(|err| anyhow!("Flushing CSV output for {target:?}: {}", err.error()))?;
        let temp = buffered
            .into_inner()
            .map_err(|err| anyhow!("Flushing buffered output for {target:?}: {}", err.error()))?;
        temp.persist(&target)
            .map_err(|err| anyhow!("Replacing {target:?}: {}", err.error))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_input_delimiter_prefers_explicit_value() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(
            resolve_encoding(Some("windows-1252")).unwrap().name(),
            "windows-1252"
        );
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn atomic_writer_only_creates_target_on_commit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let target = dir.path().join("out.csv");
        let mut writer = AtomicCsvWriter::create(&target, b',').expect("writer");
        writer.write_record(["a", "b"]).expect("row");
        assert!(!target.exists());
        writer.commit().expect("commit");
        let contents = std::fs::read_to_string(&target).expect("read");
        assert_eq!(contents, "\"a\",\"b\"\n");
    }

    #[test]
    fn necessary_quote_style_only_quotes_special_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let target = dir.path().join("out.csv");
        let mut writer =
            AtomicCsvWriter::with_quote_style(&target, b',', QuoteStyle::Necessary).expect("writer");
        writer.write_record(["State", "Jammu, Kashmir"]).expect("row");
        writer.commit().expect("commit");
        let contents = std::fs::read_to_string(&target).expect("read");
        assert_eq!(contents, "State,\"Jammu, Kashmir\"\n");
    }

    #[test]
    fn atomic_writer_dropped_without_commit_leaves_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let target = dir.path().join("out.csv");
        {
            let mut writer = AtomicCsvWriter::create(&target, b',').expect("writer");
            writer.write_record(["x"]).expect("row");
        }
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 0);
    }
}
