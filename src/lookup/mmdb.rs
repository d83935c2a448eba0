//! MaxMind database backend.
//!
//! A single [`MmdbDatabase`] type serves both source traits: City (or
//! Enterprise) databases answer [`LocationSource`] queries, ASN databases
//! answer [`OwnershipSource`] queries.

use flate2::read::GzDecoder;
use maxminddb::MaxMindDBError;
use memmap2::Mmap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use super::{Location, LocationSource, Lookup, Ownership, OwnershipSource};
use crate::error::{Error, Result};

/// Default locale for subdivision and city names.
pub const DEFAULT_LOCALE: &str = "en";

/// Options for opening a database file.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Memory-map the file instead of reading it into memory.
    ///
    /// Ignored for gzip-compressed files, which are always decompressed
    /// into memory.
    pub mmap: bool,
    /// Locale used to pick human-readable names.
    pub locale: String,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            mmap: false,
            locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

/// Backing storage of an opened database.
enum DbBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl AsRef<[u8]> for DbBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            DbBytes::Owned(bytes) => bytes.as_slice(),
            DbBytes::Mapped(map) => &map[..],
        }
    }
}

#[derive(Deserialize)]
struct Names {
    names: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct Country {
    iso_code: Option<String>,
}

#[derive(Deserialize)]
struct Subdivision {
    iso_code: Option<String>,
    names: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct Coordinates {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize)]
struct CityRecord {
    country: Option<Country>,
    subdivisions: Option<Vec<Subdivision>>,
    city: Option<Names>,
    location: Option<Coordinates>,
}

#[derive(Deserialize)]
struct AsnRecord {
    autonomous_system_number: Option<u32>,
    autonomous_system_organization: Option<String>,
}

fn localized(names: Option<&BTreeMap<String, String>>, locale: &str) -> Option<String> {
    names?
        .get(locale)
        .filter(|name| !name.is_empty())
        .cloned()
}

/// Pick the region from a subdivision list.
///
/// The most specific subdivision is the last one. Its localized name wins,
/// then its ISO code.
fn region_from_subdivisions(subdivisions: &[Subdivision], locale: &str) -> Option<String> {
    let most_specific = subdivisions.last()?;
    localized(most_specific.names.as_ref(), locale).or_else(|| {
        most_specific
            .iso_code
            .clone()
            .filter(|code| !code.is_empty())
    })
}

fn classify_error<T>(err: MaxMindDBError) -> Lookup<T> {
    match err {
        MaxMindDBError::AddressNotFoundError(_) => Lookup::NotFound,
        other => Lookup::BackendError(other.to_string()),
    }
}

/// An opened MaxMind database.
pub struct MmdbDatabase {
    reader: maxminddb::Reader<DbBytes>,
    path: PathBuf,
    locale: String,
}

impl MmdbDatabase {
    /// Open a database file.
    ///
    /// Files ending in `.gz` are decompressed on load. A missing or
    /// unreadable file is a configuration error; a file that is not a
    /// MaxMind database is a GeoIP error.
    pub fn open(path: &Path, options: &OpenOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "database file not found: {}",
                path.display()
            )));
        }

        let unreadable =
            |e: std::io::Error| Error::Config(format!("cannot read database {}: {}", path.display(), e));

        let bytes = if path.extension().map_or(false, |ext| ext == "gz") {
            let file = File::open(path).map_err(unreadable)?;
            let mut decompressed = Vec::new();
            GzDecoder::new(file)
                .read_to_end(&mut decompressed)
                .map_err(unreadable)?;
            DbBytes::Owned(decompressed)
        } else if options.mmap {
            let file = File::open(path).map_err(unreadable)?;
            // SAFETY: the mapping is read-only and lives as long as the reader.
            let map = unsafe { Mmap::map(&file) }.map_err(unreadable)?;
            DbBytes::Mapped(map)
        } else {
            DbBytes::Owned(fs::read(path).map_err(unreadable)?)
        };

        let reader = maxminddb::Reader::from_source(bytes)
            .map_err(|e| Error::GeoIp(format!("{}: {}", path.display(), e)))?;

        log::info!(
            "Opened {} database {:?} (built {})",
            reader.metadata.database_type,
            path,
            reader.metadata.build_epoch
        );

        Ok(Self {
            reader,
            path: path.to_path_buf(),
            locale: options.locale.clone(),
        })
    }

    /// Get the database type from the metadata (e.g. `GeoLite2-City`).
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    /// Get the path the database was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocationSource for MmdbDatabase {
    fn locate(&self, ip: IpAddr) -> Lookup<Location> {
        let record: CityRecord = match self.reader.lookup(ip) {
            Ok(record) => record,
            Err(e) => return classify_error(e),
        };

        let region = record
            .subdivisions
            .as_deref()
            .and_then(|subs| region_from_subdivisions(subs, &self.locale));
        let (latitude, longitude) = match record.location {
            Some(loc) => (loc.latitude, loc.longitude),
            None => (None, None),
        };

        Lookup::Found(Location {
            country_code: record.country.and_then(|c| c.iso_code),
            region,
            city: record
                .city
                .and_then(|c| localized(c.names.as_ref(), &self.locale)),
            latitude,
            longitude,
        })
    }
}

impl OwnershipSource for MmdbDatabase {
    fn owner(&self, ip: IpAddr) -> Lookup<Ownership> {
        match self.reader.lookup::<AsnRecord>(ip) {
            Ok(record) => Lookup::Found(Ownership {
                asn: record.autonomous_system_number,
                org: record.autonomous_system_organization,
            }),
            Err(e) => classify_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn names(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_region_prefers_most_specific_name() {
        let subs = vec![
            Subdivision {
                iso_code: Some("ENG".to_string()),
                names: names(&[("en", "England")]),
            },
            Subdivision {
                iso_code: Some("WSM".to_string()),
                names: names(&[("en", "Westminster"), ("de", "Westminster")]),
            },
        ];
        assert_eq!(
            region_from_subdivisions(&subs, "en"),
            Some("Westminster".to_string())
        );
    }

    #[test]
    fn test_region_falls_back_to_iso_code() {
        let subs = vec![Subdivision {
            iso_code: Some("CA".to_string()),
            names: names(&[("de", "Kalifornien")]),
        }];
        assert_eq!(region_from_subdivisions(&subs, "en"), Some("CA".to_string()));

        let subs = vec![Subdivision {
            iso_code: Some("WA".to_string()),
            names: None,
        }];
        assert_eq!(region_from_subdivisions(&subs, "en"), Some("WA".to_string()));
    }

    #[test]
    fn test_region_uses_locale() {
        let subs = vec![Subdivision {
            iso_code: Some("BY".to_string()),
            names: names(&[("en", "Bavaria"), ("de", "Bayern")]),
        }];
        assert_eq!(region_from_subdivisions(&subs, "de"), Some("Bayern".to_string()));
    }

    #[test]
    fn test_region_empty_without_subdivisions() {
        assert_eq!(region_from_subdivisions(&[], "en"), None);

        let subs = vec![Subdivision {
            iso_code: None,
            names: None,
        }];
        assert_eq!(region_from_subdivisions(&subs, "en"), None);
    }

    #[test]
    fn test_classify_error() {
        let miss: Lookup<Location> =
            classify_error(MaxMindDBError::AddressNotFoundError("8.8.8.8".to_string()));
        assert_eq!(miss, Lookup::NotFound);

        let broken: Lookup<Location> =
            classify_error(MaxMindDBError::InvalidDatabaseError("bad pointer".to_string()));
        assert!(matches!(broken, Lookup::BackendError(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let err = MmdbDatabase::open(&dir.path().join("missing.mmdb"), &OpenOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_open_invalid_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.mmdb");
        fs::write(&path, b"definitely not a maxmind database").unwrap();

        let err = MmdbDatabase::open(&path, &OpenOptions::default()).err().unwrap();
        assert!(matches!(err, Error::GeoIp(_)));

        let mmap = OpenOptions {
            mmap: true,
            ..Default::default()
        };
        let err = MmdbDatabase::open(&path, &mmap).err().unwrap();
        assert!(matches!(err, Error::GeoIp(_)));
    }

    #[test]
    fn test_open_invalid_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.mmdb.gz");

        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        encoder.write_all(b"still not a database").unwrap();
        encoder.finish().unwrap();

        let err = MmdbDatabase::open(&path, &OpenOptions::default()).err().unwrap();
        assert!(matches!(err, Error::GeoIp(_)));
    }

    #[test]
    fn test_open_corrupt_gzip_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated.mmdb.gz");
        fs::write(&path, b"\x1f\x8b\x08garbage").unwrap();

        let err = MmdbDatabase::open(&path, &OpenOptions::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    // Minimal MaxMind DB writer: a one-node IPv4 tree where 0.0.0.0/1 maps
    // to the single data record and 128.0.0.0/1 has no data.

    fn put_string(out: &mut Vec<u8>, s: &str) {
        let len = s.len();
        if len < 29 {
            out.push(0x40 | len as u8);
        } else {
            out.push(0x40 | 29);
            out.push((len - 29) as u8);
        }
        out.extend_from_slice(s.as_bytes());
    }

    fn put_map(out: &mut Vec<u8>, entries: u8) {
        out.push(0xe0 | entries);
    }

    fn put_array(out: &mut Vec<u8>, items: u8) {
        out.push(items);
        out.push(11 - 7);
    }

    fn put_double(out: &mut Vec<u8>, value: f64) {
        out.push(0x68);
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn uint_bytes(value: u32) -> Vec<u8> {
        value
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|&b| b == 0)
            .collect()
    }

    fn put_u16(out: &mut Vec<u8>, value: u16) {
        let bytes = uint_bytes(value as u32);
        out.push(0xa0 | bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }

    fn put_u32(out: &mut Vec<u8>, value: u32) {
        let bytes = uint_bytes(value);
        out.push(0xc0 | bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }

    fn put_u64(out: &mut Vec<u8>, value: u32) {
        let bytes = uint_bytes(value);
        out.push(bytes.len() as u8);
        out.push(9 - 7);
        out.extend_from_slice(&bytes);
    }

    fn build_mmdb(database_type: &str, record: &[u8]) -> Vec<u8> {
        let node_count = 1u32;
        // Left record points at data offset 0, right record means "no data".
        let mut db = vec![0, 0, (node_count + 16) as u8, 0, 0, node_count as u8];
        db.extend_from_slice(&[0u8; 16]);
        db.extend_from_slice(record);

        db.extend_from_slice(b"\xab\xcd\xefMaxMind.com");
        put_map(&mut db, 9);
        put_string(&mut db, "binary_format_major_version");
        put_u16(&mut db, 2);
        put_string(&mut db, "binary_format_minor_version");
        put_u16(&mut db, 0);
        put_string(&mut db, "build_epoch");
        put_u64(&mut db, 1_700_000_000);
        put_string(&mut db, "database_type");
        put_string(&mut db, database_type);
        put_string(&mut db, "description");
        put_map(&mut db, 1);
        put_string(&mut db, "en");
        put_string(&mut db, "test database");
        put_string(&mut db, "ip_version");
        put_u16(&mut db, 4);
        put_string(&mut db, "languages");
        put_array(&mut db, 1);
        put_string(&mut db, "en");
        put_string(&mut db, "node_count");
        put_u32(&mut db, node_count);
        put_string(&mut db, "record_size");
        put_u16(&mut db, 24);
        db
    }

    fn city_record() -> Vec<u8> {
        let mut r = Vec::new();
        put_map(&mut r, 5);
        put_string(&mut r, "city");
        put_map(&mut r, 2);
        put_string(&mut r, "geoname_id");
        put_u32(&mut r, 5_809_844);
        put_string(&mut r, "names");
        put_map(&mut r, 2);
        put_string(&mut r, "de");
        put_string(&mut r, "Seattle (WA)");
        put_string(&mut r, "en");
        put_string(&mut r, "Seattle");
        put_string(&mut r, "continent");
        put_map(&mut r, 1);
        put_string(&mut r, "code");
        put_string(&mut r, "NA");
        put_string(&mut r, "country");
        put_map(&mut r, 1);
        put_string(&mut r, "iso_code");
        put_string(&mut r, "US");
        put_string(&mut r, "location");
        put_map(&mut r, 3);
        put_string(&mut r, "accuracy_radius");
        put_u16(&mut r, 20);
        put_string(&mut r, "latitude");
        put_double(&mut r, 47.6062);
        put_string(&mut r, "longitude");
        put_double(&mut r, -122.3321);
        put_string(&mut r, "subdivisions");
        put_array(&mut r, 1);
        put_map(&mut r, 2);
        put_string(&mut r, "iso_code");
        put_string(&mut r, "WA");
        put_string(&mut r, "names");
        put_map(&mut r, 1);
        put_string(&mut r, "en");
        put_string(&mut r, "Washington");
        r
    }

    fn asn_record() -> Vec<u8> {
        let mut r = Vec::new();
        put_map(&mut r, 2);
        put_string(&mut r, "autonomous_system_number");
        put_u32(&mut r, 15169);
        put_string(&mut r, "autonomous_system_organization");
        put_string(&mut r, "Google LLC");
        r
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_locate_city_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("city.mmdb");
        fs::write(&path, build_mmdb("GeoLite2-City", &city_record())).unwrap();

        let db = MmdbDatabase::open(&path, &OpenOptions::default()).unwrap();
        assert_eq!(db.database_type(), "GeoLite2-City");
        assert_eq!(db.path(), path.as_path());

        assert_eq!(
            db.locate(ip("8.8.8.8")),
            Lookup::Found(Location {
                country_code: Some("US".to_string()),
                region: Some("Washington".to_string()),
                city: Some("Seattle".to_string()),
                latitude: Some(47.6062),
                longitude: Some(-122.3321),
            })
        );
        assert_eq!(db.locate(ip("200.1.1.1")), Lookup::NotFound);
    }

    #[test]
    fn test_locate_with_locale_and_mmap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("city.mmdb");
        fs::write(&path, build_mmdb("GeoLite2-City", &city_record())).unwrap();

        let options = OpenOptions {
            mmap: true,
            locale: "de".to_string(),
        };
        let db = MmdbDatabase::open(&path, &options).unwrap();
        let location = db.locate(ip("1.2.3.4")).found().unwrap();
        assert_eq!(location.city.as_deref(), Some("Seattle (WA)"));
        // No German subdivision name, so the ISO code is used.
        assert_eq!(location.region.as_deref(), Some("WA"));
    }

    #[test]
    fn test_owner_asn_record_from_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("asn.mmdb.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        encoder
            .write_all(&build_mmdb("GeoLite2-ASN", &asn_record()))
            .unwrap();
        encoder.finish().unwrap();

        let db = MmdbDatabase::open(&path, &OpenOptions::default()).unwrap();
        assert_eq!(db.database_type(), "GeoLite2-ASN");
        assert_eq!(
            db.owner(ip("8.8.8.8")),
            Lookup::Found(Ownership {
                asn: Some(15169),
                org: Some("Google LLC".to_string()),
            })
        );
        assert_eq!(db.owner(ip("130.0.0.1")), Lookup::NotFound);
    }
}
