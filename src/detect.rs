//! IP column auto-detection.
//!
//! Two independent strategies are tried in order:
//! 1. [`NameDetector`]: header names matched against common IP column names
//! 2. [`SampleDetector`]: the first column whose sampled values are mostly
//!    IP addresses

use ahash::AHashSet;
use csv::ByteRecord;
use once_cell::sync::Lazy;

use crate::classify::parse_ip;
use crate::error::{Error, Result};

/// Header names recognized as IP columns (lowercase).
pub const COMMON_IP_COLUMNS: &[&str] = &[
    "ip",
    "ip_address",
    "client_ip",
    "source_ip",
    "src_ip",
    "dst_ip",
    "remote_ip",
];

static COMMON_IP_SET: Lazy<AHashSet<&'static str>> =
    Lazy::new(|| COMMON_IP_COLUMNS.iter().copied().collect());

/// Cell values read as missing when NA filtering is enabled. Matched
/// exactly, without trimming.
pub const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

static NA_SET: Lazy<AHashSet<&'static [u8]>> =
    Lazy::new(|| NA_VALUES.iter().map(|v| v.as_bytes()).collect());

/// Check if a cell is one of the [`NA_VALUES`].
pub fn is_na(cell: &[u8]) -> bool {
    NA_SET.contains(cell)
}

/// Default number of rows sampled by [`SampleDetector`].
pub const DEFAULT_SAMPLE_ROWS: usize = 1000;

/// Default number of non-null values inspected per column.
pub const DEFAULT_SAMPLE_VALUES: usize = 200;

/// Default fraction of values that must parse as IP addresses.
pub const DEFAULT_SAMPLE_THRESHOLD: f64 = 0.5;

/// A strategy for picking the IP column of a table.
pub trait DetectStrategy {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Return the index of the detected column, if any.
    fn detect(&self, headers: &[String], sample: &[ByteRecord]) -> Option<usize>;
}

/// Matches header names case-insensitively against [`COMMON_IP_COLUMNS`].
///
/// The first matching column in schema order wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameDetector;

impl DetectStrategy for NameDetector {
    fn name(&self) -> &'static str {
        "name"
    }

    fn detect(&self, headers: &[String], _sample: &[ByteRecord]) -> Option<usize> {
        headers
            .iter()
            .position(|h| COMMON_IP_SET.contains(h.to_lowercase().as_str()))
    }
}

/// Picks the first column where enough sampled values parse as IPs.
#[derive(Debug, Clone, Copy)]
pub struct SampleDetector {
    /// Maximum rows considered
    pub max_rows: usize,
    /// Maximum non-null values inspected per column
    pub max_values: usize,
    /// Minimum hit ratio
    pub threshold: f64,
    /// Skip empty cells and NA tokens as nulls
    pub na_filter: bool,
}

impl Default for SampleDetector {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_SAMPLE_ROWS,
            max_values: DEFAULT_SAMPLE_VALUES,
            threshold: DEFAULT_SAMPLE_THRESHOLD,
            na_filter: false,
        }
    }
}

impl SampleDetector {
    /// Create a detector with default bounds.
    pub fn new(na_filter: bool) -> Self {
        Self {
            na_filter,
            ..Default::default()
        }
    }

    /// Fraction of sampled values in column `index` that parse as IPs.
    ///
    /// Returns `None` when the column has no sampled values.
    fn hit_ratio(&self, index: usize, sample: &[ByteRecord]) -> Option<f64> {
        let mut total = 0usize;
        let mut hits = 0usize;

        let values = sample
            .iter()
            .take(self.max_rows)
            .filter_map(|row| row.get(index))
            .filter(|cell| !(self.na_filter && is_na(cell)))
            .take(self.max_values);

        for cell in values {
            total += 1;
            if std::str::from_utf8(cell).ok().and_then(parse_ip).is_some() {
                hits += 1;
            }
        }

        if total == 0 {
            None
        } else {
            Some(hits as f64 / total as f64)
        }
    }
}

impl DetectStrategy for SampleDetector {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn detect(&self, headers: &[String], sample: &[ByteRecord]) -> Option<usize> {
        (0..headers.len()).find(|&i| {
            self.hit_ratio(i, sample)
                .map_or(false, |ratio| ratio >= self.threshold)
        })
    }
}

/// Run the strategies in order and return the first detected column name.
pub fn detect_with(
    strategies: &[&dyn DetectStrategy],
    headers: &[String],
    sample: &[ByteRecord],
) -> Result<String> {
    for strategy in strategies {
        if let Some(index) = strategy.detect(headers, sample) {
            log::debug!(
                "Detected IP column {:?} using {} strategy",
                headers[index],
                strategy.name()
            );
            return Ok(headers[index].clone());
        }
    }
    Err(Error::IpColumnNotDetected)
}

/// Detect the IP column by name first, then by sampling values.
pub fn detect_ip_column(headers: &[String], sample: &[ByteRecord], na_filter: bool) -> Result<String> {
    let sampler = SampleDetector::new(na_filter);
    detect_with(&[&NameDetector, &sampler], headers, sample)
}
