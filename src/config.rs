//! Run configuration.
//!
//! A configuration can be loaded from a YAML file and then overridden field
//! by field from the command line:
//!
//! ```yaml
//! input: access.csv
//! city_db: /var/lib/GeoIP/GeoLite2-City.mmdb
//! asn_db: /var/lib/GeoIP/GeoLite2-ASN.mmdb
//! ip_column: remote_addr
//! chunksize: 50000
//! delimiter: "\t"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::Encoding;
use crate::error::{Error, Result};
use crate::lookup::mmdb::DEFAULT_LOCALE;
use crate::lookup::{OpenOptions, DEFAULT_CACHE_CAPACITY};
use crate::transform::EnrichOptions;

/// Default name of the inserted column.
pub const DEFAULT_GEOIP_COLUMN: &str = "geoip";

/// Default marker written for invalid addresses when `keep_invalid` is set.
pub const DEFAULT_INVALID_MARKER: &str = "invalid_ip";

/// Suffix of the default output file name.
pub const DEFAULT_OUTPUT_SUFFIX: &str = ".geoip.csv";

/// CSV dialect shared by input and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub encoding: Encoding,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            encoding: Encoding::utf8(),
        }
    }
}

/// Parse a single-byte dialect option. `\t` is accepted for tab.
fn dialect_byte(option: &str, value: &str) -> Result<u8> {
    let c = match value {
        "\\t" => '\t',
        _ => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(Error::Config(format!(
                        "{} must be a single character, got {:?}",
                        option, value
                    )))
                }
            }
        }
    };

    if !c.is_ascii() {
        return Err(Error::Config(format!(
            "{} must be an ASCII character, got {:?}",
            option, value
        )));
    }
    Ok(c as u8)
}

/// Default output path: the input's file stem plus `.geoip.csv`, next to
/// the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}", stem, DEFAULT_OUTPUT_SUFFIX))
}

/// Resolve a path that may not exist yet: the path itself when it exists,
/// otherwise its canonical parent joined with the file name.
fn resolve_target(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}

/// Check whether two paths name the same file, following `..` and symlinks.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (resolve_target(a), resolve_target(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Full configuration of an enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichConfig {
    /// Input table
    pub input: Option<PathBuf>,
    /// Output table (default derived from the input path)
    pub output: Option<PathBuf>,
    /// City (location) database
    pub city_db: Option<PathBuf>,
    /// ASN (ownership) database
    pub asn_db: Option<PathBuf>,
    /// Explicit IP column; auto-detected when unset
    pub ip_column: Option<String>,
    /// Name of the inserted column
    pub geoip_column: String,
    /// Rows per batch; 0 processes the whole table at once
    pub chunksize: usize,
    pub delimiter: String,
    pub quotechar: String,
    pub encoding: Encoding,
    /// Read empty cells and NA tokens (`NA`, `NULL`, `nan`, ...) as missing
    pub na_filter: bool,
    /// Write `invalid_marker` for invalid addresses instead of an empty field
    pub keep_invalid: bool,
    pub invalid_marker: String,
    /// Lookup cache entries; 0 disables the cache
    pub cache_size: usize,
    /// Memory-map database files
    pub mmap: bool,
    /// Locale for region and city names
    pub locale: String,
    /// Where to write run statistics as JSON
    pub stats: Option<PathBuf>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            city_db: None,
            asn_db: None,
            ip_column: None,
            geoip_column: DEFAULT_GEOIP_COLUMN.to_string(),
            chunksize: 0,
            delimiter: ",".to_string(),
            quotechar: "\"".to_string(),
            encoding: Encoding::utf8(),
            na_filter: false,
            keep_invalid: false,
            invalid_marker: DEFAULT_INVALID_MARKER.to_string(),
            cache_size: DEFAULT_CACHE_CAPACITY,
            mmap: false,
            locale: DEFAULT_LOCALE.to_string(),
            stats: None,
        }
    }
}

impl EnrichConfig {
    /// Parse a configuration from YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Get the input path.
    pub fn input_path(&self) -> Result<&Path> {
        self.input
            .as_deref()
            .ok_or_else(|| Error::Config("input path is required".to_string()))
    }

    /// Get the city database path.
    pub fn city_db_path(&self) -> Result<&Path> {
        self.city_db
            .as_deref()
            .ok_or_else(|| Error::Config("city database path is required".to_string()))
    }

    /// Get the output path, deriving it from the input when unset.
    pub fn output_path(&self) -> Result<PathBuf> {
        match self.output {
            Some(ref out) => Ok(out.clone()),
            None => Ok(default_output_path(self.input_path()?)),
        }
    }

    /// Get the table dialect.
    pub fn dialect(&self) -> Result<Dialect> {
        let delimiter = dialect_byte("delimiter", &self.delimiter)?;
        let quote = dialect_byte("quotechar", &self.quotechar)?;
        if delimiter == quote {
            return Err(Error::Config(
                "delimiter and quotechar must differ".to_string(),
            ));
        }
        Ok(Dialect {
            delimiter,
            quote,
            encoding: self.encoding,
        })
    }

    /// Get the database open options.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            mmap: self.mmap,
            locale: self.locale.clone(),
        }
    }

    /// Get the transformer options.
    pub fn enrich_options(&self) -> Result<EnrichOptions> {
        Ok(EnrichOptions {
            ip_column: self.ip_column.clone(),
            geoip_column: self.geoip_column.clone(),
            invalid_marker: self.keep_invalid.then(|| self.invalid_marker.clone()),
            batch_size: self.chunksize,
            na_filter: self.na_filter,
            dialect: self.dialect()?,
        })
    }

    /// Check the configuration before any file is touched.
    pub fn validate(&self) -> Result<()> {
        let input = self.input_path()?;
        self.city_db_path()?;

        if self.geoip_column.is_empty() {
            return Err(Error::Config(
                "inserted column name must not be empty".to_string(),
            ));
        }
        if matches!(self.ip_column.as_deref(), Some("")) {
            return Err(Error::Config("IP column name must not be empty".to_string()));
        }
        self.dialect()?;

        if !input.is_file() {
            return Err(Error::Config(format!(
                "input file not found: {}",
                input.display()
            )));
        }
        let output = self.output_path()?;
        if same_file(&output, input) {
            return Err(Error::Config(format!(
                "output path must differ from input path: {}",
                output.display()
            )));
        }
        Ok(())
    }
}
