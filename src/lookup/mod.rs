//! Lookup backends and the fault-tolerant adapter that merges them.
//!
//! Two independent sources are consulted per address:
//! - a [`LocationSource`] (required) for country, region, city and coordinates
//! - an [`OwnershipSource`] (optional) for the autonomous system
//!
//! Each call reports an explicit [`Lookup`] outcome. [`GeoLookup`] counts the
//! outcomes and collapses misses and backend errors into empty fields, so a
//! single bad address never aborts a run.

pub mod mmdb;

pub use mmdb::{MmdbDatabase, OpenOptions};

use quick_cache::sync::Cache;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::record::LookupResult;

/// Default lookup cache capacity (number of addresses).
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Outcome of a single backend query.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The backend has a record for the address
    Found(T),
    /// The address is not in the database
    NotFound,
    /// The backend failed to answer (corrupt record, decode error, ...)
    BackendError(String),
}

impl<T> Lookup<T> {
    /// Collapse the outcome into an optional value.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::BackendError(_) => None,
        }
    }
}

/// Location fields returned by a [`LocationSource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Network ownership fields returned by an [`OwnershipSource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ownership {
    pub asn: Option<u32>,
    pub org: Option<String>,
}

/// Backend resolving an address to a location.
pub trait LocationSource: Send + Sync {
    /// Look up the location of an address.
    fn locate(&self, ip: IpAddr) -> Lookup<Location>;
}

/// Backend resolving an address to its network owner.
pub trait OwnershipSource: Send + Sync {
    /// Look up the autonomous system of an address.
    fn owner(&self, ip: IpAddr) -> Lookup<Ownership>;
}

/// Outcome counters for one source.
#[derive(Debug, Default)]
struct SourceCounters {
    found: AtomicU64,
    not_found: AtomicU64,
    errors: AtomicU64,
}

impl SourceCounters {
    fn record<T>(&self, outcome: &Lookup<T>) {
        let counter = match outcome {
            Lookup::Found(_) => &self.found,
            Lookup::NotFound => &self.not_found,
            Lookup::BackendError(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SourceStats {
        SourceStats {
            found: self.found.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of outcome counts for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub found: u64,
    pub not_found: u64,
    pub errors: u64,
}

impl SourceStats {
    /// Total number of queries sent to the source.
    pub fn queries(&self) -> u64 {
        self.found + self.not_found + self.errors
    }
}

/// Snapshot of all lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub location: SourceStats,
    pub ownership: SourceStats,
    pub cache_hits: u64,
}

/// Fault-tolerant adapter over a location source and an optional ownership
/// source, with an optional result cache.
///
/// # Example
///
/// ```ignore
/// use geoip_enrich::lookup::{GeoLookup, MmdbDatabase, OpenOptions};
/// use std::path::Path;
///
/// let opts = OpenOptions::default();
/// let city = MmdbDatabase::open(Path::new("GeoLite2-City.mmdb"), &opts)?;
/// let asn = MmdbDatabase::open(Path::new("GeoLite2-ASN.mmdb"), &opts)?;
///
/// let lookup = GeoLookup::new(Box::new(city), Some(Box::new(asn)));
/// let result = lookup.lookup("8.8.8.8".parse()?);
/// ```
pub struct GeoLookup {
    primary: Box<dyn LocationSource>,
    secondary: Option<Box<dyn OwnershipSource>>,
    cache: Option<Cache<IpAddr, LookupResult>>,
    location: SourceCounters,
    ownership: SourceCounters,
    cache_hits: AtomicU64,
}

impl GeoLookup {
    /// Create an adapter without a cache.
    pub fn new(
        primary: Box<dyn LocationSource>,
        secondary: Option<Box<dyn OwnershipSource>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            cache: None,
            location: SourceCounters::default(),
            ownership: SourceCounters::default(),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Enable a result cache holding up to `capacity` addresses.
    ///
    /// A capacity of 0 disables caching.
    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = if capacity > 0 {
            Some(Cache::new(capacity))
        } else {
            None
        };
        self
    }

    /// Look up an address in both sources and merge the results.
    ///
    /// Never fails: a miss or error from either source only empties that
    /// source's fields.
    pub fn lookup(&self, ip: IpAddr) -> LookupResult {
        if let Some(ref cache) = self.cache {
            if let Some(hit) = cache.get(&ip) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return hit;
            }
        }

        let result = self.query(ip);

        if let Some(ref cache) = self.cache {
            cache.insert(ip, result.clone());
        }

        result
    }

    fn query(&self, ip: IpAddr) -> LookupResult {
        let location = self.primary.locate(ip);
        self.location.record(&location);
        if let Lookup::BackendError(ref e) = location {
            log::trace!("location lookup failed for {}: {}", ip, e);
        }

        let ownership = match self.secondary {
            Some(ref source) => {
                let outcome = source.owner(ip);
                self.ownership.record(&outcome);
                if let Lookup::BackendError(ref e) = outcome {
                    log::trace!("ownership lookup failed for {}: {}", ip, e);
                }
                outcome.found().unwrap_or_default()
            }
            None => Ownership::default(),
        };

        let location = location.found().unwrap_or_default();

        LookupResult {
            country_code: location.country_code,
            region: location.region,
            city: location.city,
            latitude: location.latitude,
            longitude: location.longitude,
            asn: ownership.asn,
            org: ownership.org,
        }
    }

    /// Get a snapshot of the outcome counters.
    pub fn stats(&self) -> LookupStats {
        LookupStats {
            location: self.location.snapshot(),
            ownership: self.ownership.snapshot(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}
