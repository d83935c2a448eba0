//! geoip-enrich: insert a GeoIP column next to the IP column of a CSV file.

use clap::Parser;
use geoip_enrich::{Encoding, EnrichConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geoip-enrich")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Enrich a CSV with a GeoIP column using local MaxMind databases", long_about = None)]
struct Cli {
    /// Input CSV path
    #[arg(short, long = "in", value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output CSV path (default: <input stem>.geoip.csv)
    #[arg(short, long = "out", value_name = "PATH")]
    output: Option<PathBuf>,

    /// GeoLite2-City.mmdb (or commercial City database)
    #[arg(long = "db", value_name = "PATH")]
    city_db: Option<PathBuf>,

    /// GeoLite2-ASN.mmdb (optional)
    #[arg(long, value_name = "PATH")]
    asn_db: Option<PathBuf>,

    /// Name of the IP address column (auto-detected if omitted)
    #[arg(long = "ip-col", value_name = "NAME")]
    ip_column: Option<String>,

    /// Name of the inserted column [default: geoip]
    #[arg(long = "geoip-col", value_name = "NAME")]
    geoip_column: Option<String>,

    /// Process the CSV in batches of this many rows (0 = load all at once)
    #[arg(long, value_name = "ROWS")]
    chunksize: Option<usize>,

    /// CSV delimiter [default: ,]
    #[arg(long, value_name = "CHAR")]
    sep: Option<String>,

    /// CSV quote character [default: "]
    #[arg(long, value_name = "CHAR")]
    quotechar: Option<String>,

    /// CSV encoding, e.g. utf-8, latin-1, cp1252, utf-16, shift_jis [default: utf-8]
    #[arg(long, value_name = "LABEL")]
    encoding: Option<String>,

    /// Read empty cells and NA tokens (NA, NULL, nan, ...) as missing values
    #[arg(long)]
    na_filter: bool,

    /// Write a marker for invalid IPs instead of an empty field
    #[arg(long)]
    keep_invalid: bool,

    /// Marker used with --keep-invalid [default: invalid_ip]
    #[arg(long, value_name = "TEXT")]
    invalid_marker: Option<String>,

    /// Lookup cache size in addresses, 0 disables [default: 10000]
    #[arg(long, value_name = "ENTRIES")]
    cache_size: Option<usize>,

    /// Memory-map database files instead of reading them
    #[arg(long)]
    mmap: bool,

    /// Locale for region and city names [default: en]
    #[arg(long, value_name = "LOCALE")]
    locale: Option<String>,

    /// Write run statistics as JSON to this path
    #[arg(long, value_name = "PATH")]
    stats: Option<PathBuf>,

    /// YAML configuration file; command-line flags override its values
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer the command-line flags over the base configuration.
    fn into_config(self) -> geoip_enrich::Result<EnrichConfig> {
        let mut config = match self.config {
            Some(ref path) => EnrichConfig::load(path)?,
            None => EnrichConfig::default(),
        };

        if self.input.is_some() {
            config.input = self.input;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        if self.city_db.is_some() {
            config.city_db = self.city_db;
        }
        if self.asn_db.is_some() {
            config.asn_db = self.asn_db;
        }
        if self.ip_column.is_some() {
            config.ip_column = self.ip_column;
        }
        if let Some(name) = self.geoip_column {
            config.geoip_column = name;
        }
        if let Some(rows) = self.chunksize {
            config.chunksize = rows;
        }
        if let Some(sep) = self.sep {
            config.delimiter = sep;
        }
        if let Some(quote) = self.quotechar {
            config.quotechar = quote;
        }
        if let Some(label) = self.encoding {
            config.encoding = Encoding::from_label(&label).ok_or_else(|| {
                geoip_enrich::Error::Config(format!("unsupported encoding: {}", label))
            })?;
        }
        if let Some(marker) = self.invalid_marker {
            config.invalid_marker = marker;
        }
        if let Some(size) = self.cache_size {
            config.cache_size = size;
        }
        if let Some(locale) = self.locale {
            config.locale = locale;
        }
        if self.stats.is_some() {
            config.stats = self.stats;
        }
        config.na_filter |= self.na_filter;
        config.keep_invalid |= self.keep_invalid;
        config.mmap |= self.mmap;

        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = cli.into_config().and_then(|config| geoip_enrich::run(&config));
    match result {
        Ok(summary) => println!("Wrote: {}", summary.output.display()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
