//! geoip-enrich - Enrich CSV tables with GeoIP data from local MaxMind databases.
//!
//! A single column is inserted immediately to the right of the IP column.
//! Each value packs location and network ownership into one `|`-separated
//! field:
//!
//! ```text
//! country|region|city|lat|lon|ASn|org
//! US|Washington|Seattle|47.606200|-122.332100|AS15169|Google LLC
//! ```
//!
//! # Features
//!
//! - **Column-preserving**: every input column keeps its position and order
//! - **Auto-detection**: the IP column is found by name or by sampling values
//! - **Private ranges skipped**: non-routable addresses are never looked up
//! - **Fault-tolerant lookups**: misses and backend errors leave empty slots
//! - **Streaming**: bounded-memory batch mode for large inputs
//! - **Optional ASN database**: ownership fields stay empty without one
//! - **Any text encoding**: non-UTF-8 tables are transcoded with `encoding_rs`
//!
//! # Quick Start
//!
//! ```ignore
//! use geoip_enrich::{run, EnrichConfig};
//!
//! let config = EnrichConfig {
//!     input: Some("access.csv".into()),
//!     city_db: Some("GeoLite2-City.mmdb".into()),
//!     asn_db: Some("GeoLite2-ASN.mmdb".into()),
//!     chunksize: 50_000,
//!     ..Default::default()
//! };
//!
//! let summary = run(&config)?;
//! println!("Wrote: {}", summary.output.display());
//! ```
//!
//! # Custom backends
//!
//! Lookups go through the [`LocationSource`] and [`OwnershipSource`] traits,
//! so any backend can be plugged into a [`GeoLookup`]:
//!
//! ```ignore
//! use geoip_enrich::{EnrichOptions, Enricher, GeoLookup};
//!
//! let lookup = GeoLookup::new(Box::new(my_locations), None).with_cache(10_000);
//! let enricher = Enricher::new(lookup, EnrichOptions::default());
//! let stats = enricher.run(input, || Ok(output))?;
//! ```

mod error;

pub mod classify;
pub mod codec;
pub mod config;
pub mod detect;
pub mod lookup;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod table;
pub mod transform;

// Re-export core types
pub use error::{Error, Result};

pub use classify::{classify, parse_ip, IpClass};
pub use codec::Encoding;
pub use config::{Dialect, EnrichConfig};
pub use detect::{detect_ip_column, DetectStrategy, NameDetector, SampleDetector};
pub use lookup::{
    GeoLookup, Location, LocationSource, Lookup, LookupStats, MmdbDatabase, OpenOptions,
    Ownership, OwnershipSource,
};
pub use pipeline::{run, RunSummary};
pub use record::{encode, LookupResult};
pub use schema::{insert_column, ColumnInsertion};
pub use table::{Table, TableReader, TableWriter};
pub use transform::{EnrichOptions, EnrichStats, Enricher};
