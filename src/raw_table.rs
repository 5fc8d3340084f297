//! Column-oriented in-memory table plus a chunked CSV scanner.
//!
//! A [`RawTable`] keeps every cell as the raw decoded string; numeric
//! interpretation happens later, per stage, through [`crate::data`]. Tables are
//! never mutated after construction: projections and slices build new tables.

use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::Encoding;

use crate::{error::PipelineError, header::NormalizedHeaders, io_utils};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    columns: Vec<Vec<String>>,
    row_count: usize,
}

impl RawTable {
    /// Builds a table from columns. Every column must have the same length.
    pub fn new(headers: Vec<String>, columns: Vec<Vec<String>>) -> Result<Self, PipelineError> {
        let row_count = columns.first().map(Vec::len).unwrap_or(0);
        for (idx, column) in columns.iter().enumerate() {
            if column.len() != row_count {
                return Err(PipelineError::RaggedTable {
                    column: headers
                        .get(idx)
                        .cloned()
                        .unwrap_or_else(|| format!("#{}", idx + 1)),
                    expected: row_count,
                    found: column.len(),
                });
            }
        }
        if headers.len() != columns.len() {
            return Err(PipelineError::RaggedTable {
                column: "<header row>".to_string(),
                expected: columns.len(),
                found: headers.len(),
            });
        }
        Ok(Self {
            headers,
            columns,
            row_count,
        })
    }

    /// Builds a table from row-major data.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, PipelineError> {
        let mut columns = vec![Vec::with_capacity(rows.len()); headers.len()];
        for row in rows {
            if row.len() != headers.len() {
                return Err(PipelineError::RaggedTable {
                    column: "<row>".to_string(),
                    expected: headers.len(),
                    found: row.len(),
                });
            }
            for (column, cell) in columns.iter_mut().zip(row) {
                column.push(cell);
            }
        }
        Self::new(headers, columns)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn column(&self, idx: usize) -> &[String] {
        &self.columns[idx]
    }

    pub fn cell(&self, column: usize, row: usize) -> &str {
        self.columns
            .get(column)
            .and_then(|values| values.get(row))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Row-major copy of one row.
    pub fn row(&self, row: usize) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column[row].clone())
            .collect()
    }

    /// New table containing only the kept columns, under their normalized
    /// names.
    pub fn project(&self, normalized: &NormalizedHeaders) -> RawTable {
        let columns = normalized
            .source_indices
            .iter()
            .map(|idx| self.columns[*idx].clone())
            .collect();
        RawTable {
            headers: normalized.names.clone(),
            columns,
            row_count: self.row_count,
        }
    }

    /// New table holding rows `start..start + len` (clamped to the table).
    pub fn slice_rows(&self, start: usize, len: usize) -> RawTable {
        let start = start.min(self.row_count);
        let end = start.saturating_add(len).min(self.row_count);
        RawTable {
            headers: self.headers.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| column[start..end].to_vec())
                .collect(),
            row_count: end - start,
        }
    }

    /// Splits the table into consecutive chunks of at most `size` rows.
    pub fn chunks(&self, size: usize) -> Vec<RawTable> {
        let size = size.max(1);
        (0..self.row_count)
            .step_by(size)
            .map(|start| self.slice_rows(start, size))
            .collect()
    }
}

/// Streams a CSV file as a sequence of [`RawTable`] chunks of fixed size.
pub struct ChunkedReader {
    reader: csv::Reader<Box<dyn std::io::Read>>,
    headers: Vec<String>,
    encoding: &'static Encoding,
    chunk_size: usize,
    rows_read: usize,
    record: csv::ByteRecord,
}

impl ChunkedReader {
    pub fn open(
        path: &Path,
        delimiter: u8,
        encoding: &'static Encoding,
        chunk_size: usize,
    ) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)
            .with_context(|| format!("Reading headers from {path:?}"))?;
        Ok(Self {
            reader,
            headers,
            encoding,
            chunk_size: chunk_size.max(1),
            rows_read: 0,
            record: csv::ByteRecord::new(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Next chunk, or `None` once the file is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<RawTable>> {
        let mut rows = Vec::with_capacity(self.chunk_size);
        while rows.len() < self.chunk_size {
            let more = self
                .reader
                .read_byte_record(&mut self.record)
                .with_context(|| format!("Reading row {}", self.rows_read + 2))?;
            if !more {
                break;
            }
            rows.push(io_utils::decode_record(&self.record, self.encoding)?);
            self.rows_read += 1;
        }
        if rows.is_empty() {
            return Ok(None);
        }
        let table = RawTable::from_rows(self.headers.clone(), rows)?;
        Ok(Some(table))
    }
}
