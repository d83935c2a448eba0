//! File-level enrichment runs.
//!
//! Opens the databases named by an [`EnrichConfig`], streams the input file
//! through an [`Enricher`] and writes the output file.

use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::EnrichConfig;
use crate::error::{Error, Result};
use crate::lookup::{GeoLookup, MmdbDatabase, OwnershipSource};
use crate::transform::{EnrichStats, Enricher};

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output: PathBuf,
    pub stats: EnrichStats,
}

/// Open the lookup backends named by the configuration.
///
/// Any missing or unreadable database fails here, before a single row is
/// read.
pub fn open_lookup(config: &EnrichConfig) -> Result<GeoLookup> {
    let options = config.open_options();

    let city = MmdbDatabase::open(config.city_db_path()?, &options)?;
    let db_type = city.database_type();
    if !db_type.contains("City") && !db_type.contains("Enterprise") {
        log::warn!(
            "{:?} is a {} database; location fields may be empty",
            city.path(),
            db_type
        );
    }

    let asn: Option<Box<dyn OwnershipSource>> = match config.asn_db {
        Some(ref path) => Some(Box::new(MmdbDatabase::open(path, &options)?)),
        None => None,
    };

    Ok(GeoLookup::new(Box::new(city), asn).with_cache(config.cache_size))
}

/// Save run statistics as pretty-printed JSON.
pub fn save_stats(path: impl AsRef<Path>, stats: &EnrichStats) -> Result<()> {
    let content = serde_json::to_string_pretty(stats)?;
    fs::write(path, content)?;
    Ok(())
}

/// Run an enrichment over an already opened lookup adapter.
pub fn run_with_lookup(config: &EnrichConfig, lookup: GeoLookup) -> Result<RunSummary> {
    config.validate()?;
    let input_path = config.input_path()?;
    let output = config.output_path()?;

    let input = File::open(input_path).map_err(|e| {
        Error::Config(format!("cannot read input {}: {}", input_path.display(), e))
    })?;

    let enricher = Enricher::new(lookup, config.enrich_options()?);
    if config.chunksize > 0 {
        log::info!("Processing {:?} in batches of {} rows", input_path, config.chunksize);
    } else {
        log::info!("Processing {:?} in memory", input_path);
    }

    let stats = enricher.run(input, || {
        File::create(&output).map_err(|e| {
            Error::Config(format!("cannot write output {}: {}", output.display(), e))
        })
    })?;

    log::info!(
        "Enriched {} of {} rows ({} public, {} non-routable, {} invalid, {} empty, {} cache hits)",
        stats.enriched,
        stats.rows,
        stats.public,
        stats.non_routable,
        stats.invalid,
        stats.empty,
        stats.lookups.cache_hits
    );
    if stats.lookups.location.errors + stats.lookups.ownership.errors > 0 {
        log::warn!(
            "{} location and {} ownership lookups failed and were left empty",
            stats.lookups.location.errors,
            stats.lookups.ownership.errors
        );
    }

    if let Some(ref path) = config.stats {
        save_stats(path, &stats)?;
    }

    Ok(RunSummary { output, stats })
}

/// Run an enrichment described by the configuration.
pub fn run(config: &EnrichConfig) -> Result<RunSummary> {
    config.validate()?;
    let lookup = open_lookup(config)?;
    run_with_lookup(config, lookup)
}
