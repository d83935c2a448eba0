//! CSV table reading and writing.
//!
//! Cells are kept as raw bytes. UTF-8 tables pass through untouched; other
//! encodings are transcoded to UTF-8 on read and back on write (see
//! [`codec`](crate::codec)).

use ahash::AHashSet;
use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use std::io::{Read, Write};

use crate::codec::{DecodeReader, EncodeWriter};
use crate::config::Dialect;
use crate::error::{Error, Result};

/// An in-memory table: column names plus raw rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<ByteRecord>,
}

impl Table {
    /// Create a table from string rows.
    pub fn from_rows<S: AsRef<str>>(columns: &[S], rows: &[Vec<S>]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.as_ref()).collect())
                .collect(),
        }
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the values of a column as UTF-8 text (lossy).
    pub fn column(&self, name: &str) -> Option<Vec<String>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| String::from_utf8_lossy(row.get(index).unwrap_or_default()).into_owned())
                .collect(),
        )
    }
}

/// Streaming CSV reader yielding batches of raw rows.
pub struct TableReader<R: Read> {
    inner: csv::Reader<DecodeReader<R>>,
    columns: Vec<String>,
}

impl<R: Read> TableReader<R> {
    /// Open a reader and parse the header row.
    ///
    /// Fails with [`Error::DuplicateColumn`] if a header name repeats.
    pub fn new(rdr: R, dialect: &Dialect) -> Result<Self> {
        let mut inner = ReaderBuilder::new()
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .has_headers(true)
            .from_reader(DecodeReader::new(rdr, dialect.encoding));

        let columns: Vec<String> = inner
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();

        let mut seen = AHashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateColumn(name.clone()));
            }
        }

        Ok(Self { inner, columns })
    }

    /// Get the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Read up to `max_rows` rows. An empty batch means end of input.
    pub fn read_batch(&mut self, max_rows: usize) -> Result<Vec<ByteRecord>> {
        let mut batch = Vec::with_capacity(max_rows.min(64 * 1024));
        let mut record = ByteRecord::new();
        while batch.len() < max_rows && self.inner.read_byte_record(&mut record)? {
            batch.push(record.clone());
        }
        Ok(batch)
    }

    /// Read all remaining rows into a table.
    pub fn read_all(mut self) -> Result<Table> {
        let mut rows = Vec::new();
        for record in self.inner.byte_records() {
            rows.push(record?);
        }
        Ok(Table {
            columns: self.columns,
            rows,
        })
    }
}

/// CSV writer using the same dialect as the input.
pub struct TableWriter<W: Write> {
    inner: csv::Writer<EncodeWriter<W>>,
}

impl<W: Write> TableWriter<W> {
    /// Create a writer.
    pub fn new(wtr: W, dialect: &Dialect) -> Self {
        let inner = WriterBuilder::new()
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .from_writer(EncodeWriter::new(wtr, dialect.encoding));
        Self { inner }
    }

    /// Write the header row.
    pub fn write_header(&mut self, columns: &[String]) -> Result<()> {
        self.inner.write_record(columns)?;
        Ok(())
    }

    /// Write raw rows.
    pub fn write_rows(&mut self, rows: &[ByteRecord]) -> Result<()> {
        for row in rows {
            self.inner.write_byte_record(row)?;
        }
        Ok(())
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
