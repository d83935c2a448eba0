//! The enrichment transformer.
//!
//! Drives classification, lookup, encoding and column insertion over a
//! table, either all at once or in bounded batches. Both modes write the
//! same bytes for the same input and resolved IP column.

use csv::ByteRecord;
use serde::Serialize;
use std::io::{Read, Write};

use crate::classify::{classify_ip, parse_ip, IpClass};
use crate::config::{Dialect, DEFAULT_GEOIP_COLUMN};
use crate::detect::{detect_ip_column, is_na};
use crate::error::Result;
use crate::lookup::{GeoLookup, LookupStats};
use crate::record::encode;
use crate::schema::ColumnInsertion;
use crate::table::{Table, TableReader, TableWriter};

/// Options controlling a transformation.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Explicit IP column; auto-detected when `None`
    pub ip_column: Option<String>,
    /// Name of the inserted column
    pub geoip_column: String,
    /// Literal written for invalid addresses; empty field when `None`
    pub invalid_marker: Option<String>,
    /// Rows per batch; 0 selects whole-table mode
    pub batch_size: usize,
    /// Read empty cells and NA tokens as missing values, both when
    /// sampling for the IP column and when enriching
    pub na_filter: bool,
    pub dialect: Dialect,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            ip_column: None,
            geoip_column: DEFAULT_GEOIP_COLUMN.to_string(),
            invalid_marker: None,
            batch_size: 0,
            na_filter: false,
            dialect: Dialect::default(),
        }
    }
}

/// How a single cell was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellOutcome {
    Empty,
    Invalid,
    NonRoutable,
    /// Public, but neither source knew the address
    Missed,
    Enriched,
}

/// Counters for one transformation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    /// Rows processed
    pub rows: u64,
    /// Cells empty after trimming, or NA tokens with `na_filter`
    pub empty: u64,
    /// Cells that are not IP addresses
    pub invalid: u64,
    /// Non-routable addresses (never looked up)
    pub non_routable: u64,
    /// Public addresses (looked up)
    pub public: u64,
    /// Public addresses with at least one field found
    pub enriched: u64,
    /// Batches written
    pub batches: u64,
    /// Backend outcome counters over the lifetime of the enricher
    pub lookups: LookupStats,
}

impl EnrichStats {
    fn record(&mut self, outcome: CellOutcome) {
        self.rows += 1;
        match outcome {
            CellOutcome::Empty => self.empty += 1,
            CellOutcome::Invalid => self.invalid += 1,
            CellOutcome::NonRoutable => self.non_routable += 1,
            CellOutcome::Missed => self.public += 1,
            CellOutcome::Enriched => {
                self.public += 1;
                self.enriched += 1;
            }
        }
    }
}

/// Inserts an encoded GeoIP column next to the IP column of a table.
pub struct Enricher {
    lookup: GeoLookup,
    options: EnrichOptions,
}

impl Enricher {
    /// Create an enricher over an opened lookup adapter.
    pub fn new(lookup: GeoLookup, options: EnrichOptions) -> Self {
        Self { lookup, options }
    }

    fn invalid_field(&self) -> String {
        self.options.invalid_marker.clone().unwrap_or_default()
    }

    fn evaluate(&self, cell: &[u8]) -> (CellOutcome, String) {
        if self.options.na_filter && is_na(cell) {
            return (CellOutcome::Empty, String::new());
        }
        let text = match std::str::from_utf8(cell) {
            Ok(text) => text.trim(),
            Err(_) => return (CellOutcome::Invalid, self.invalid_field()),
        };
        if text.is_empty() {
            return (CellOutcome::Empty, String::new());
        }

        let ip = match parse_ip(text) {
            Some(ip) => ip,
            None => return (CellOutcome::Invalid, self.invalid_field()),
        };

        match classify_ip(ip) {
            IpClass::Public => {
                let result = self.lookup.lookup(ip);
                let outcome = if result.is_empty() {
                    CellOutcome::Missed
                } else {
                    CellOutcome::Enriched
                };
                (outcome, encode(&result))
            }
            _ => (CellOutcome::NonRoutable, String::new()),
        }
    }

    /// Compute the inserted field for one IP cell.
    ///
    /// Empty cells, NA tokens (with `na_filter`) and non-routable addresses
    /// give an empty field without a lookup. Invalid values give the invalid marker, or an empty field when
    /// no marker is configured. Public addresses are looked up and encoded,
    /// so a lookup that finds nothing in either source still gives all
    /// seven (empty) slots.
    pub fn enrich_value(&self, cell: &[u8]) -> String {
        self.evaluate(cell).1
    }

    /// Resolve the IP column and plan the insertion.
    ///
    /// Uses the configured column when set, otherwise detects one from the
    /// header and the sample rows.
    pub fn resolve_column(&self, columns: &[String], sample: &[ByteRecord]) -> Result<ColumnInsertion> {
        let ip_column = match self.options.ip_column {
            Some(ref column) => column.clone(),
            None => detect_ip_column(columns, sample, self.options.na_filter)?,
        };

        let plan = ColumnInsertion::new(columns, &ip_column, &self.options.geoip_column)?;
        log::info!(
            "Using IP column {:?}, inserting {:?} at position {}",
            plan.source_column(),
            plan.new_column(),
            plan.source_index() + 1
        );
        Ok(plan)
    }

    /// Transform rows according to a resolved plan, preserving order.
    pub fn enrich_rows(
        &self,
        plan: &ColumnInsertion,
        rows: &[ByteRecord],
        stats: &mut EnrichStats,
    ) -> Vec<ByteRecord> {
        rows.iter()
            .map(|row| {
                let cell = plan.source_cell(row).unwrap_or_default();
                let (outcome, field) = self.evaluate(cell);
                stats.record(outcome);
                plan.project(row, field.as_bytes())
            })
            .collect()
    }

    /// Transform a whole in-memory table.
    pub fn enrich_table(&self, table: &Table) -> Result<Table> {
        let plan = self.resolve_column(&table.columns, &table.rows)?;
        let rows = self.enrich_rows(&plan, &table.rows, &mut EnrichStats::default());
        Ok(Table {
            columns: plan.output_schema().to_vec(),
            rows,
        })
    }

    /// Read a table from `input`, enrich it and write it to the writer
    /// returned by `open_output`.
    ///
    /// The output is opened after the IP column has been resolved and before
    /// any row is looked up. Detection and schema errors never leave an
    /// output behind, and an output that cannot be opened costs no lookups.
    /// In chunked mode a failure after the first batch leaves the rows
    /// written so far, header included.
    pub fn run<R, W, F>(&self, input: R, open_output: F) -> Result<EnrichStats>
    where
        R: Read,
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        let dialect = self.options.dialect;
        let mut reader = TableReader::new(input, &dialect)?;
        let mut stats = EnrichStats::default();

        if self.options.batch_size == 0 {
            let table = reader.read_all()?;
            let plan = self.resolve_column(&table.columns, &table.rows)?;

            let mut writer = TableWriter::new(open_output()?, &dialect);
            let rows = self.enrich_rows(&plan, &table.rows, &mut stats);
            writer.write_header(plan.output_schema())?;
            writer.write_rows(&rows)?;
            writer.flush()?;
            stats.batches = 1;
        } else {
            let batch_size = self.options.batch_size;
            let mut batch = reader.read_batch(batch_size)?;
            let plan = self.resolve_column(reader.columns(), &batch)?;

            let mut writer = TableWriter::new(open_output()?, &dialect);
            writer.write_header(plan.output_schema())?;

            while !batch.is_empty() {
                let rows = self.enrich_rows(&plan, &batch, &mut stats);
                writer.write_rows(&rows)?;
                writer.flush()?;
                stats.batches += 1;
                log::debug!(
                    "Wrote batch {} ({} rows, {} total)",
                    stats.batches,
                    rows.len(),
                    stats.rows
                );
                batch = reader.read_batch(batch_size)?;
            }
        }

        stats.lookups = self.lookup.stats();
        Ok(stats)
    }
}
