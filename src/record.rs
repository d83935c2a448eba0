//! Lookup results and their compact single-column encoding.

use std::fmt::Write;

/// Separator between encoded slots.
pub const FIELD_SEPARATOR: char = '|';

/// Number of slots in every encoded field.
pub const FIELD_COUNT: usize = 7;

/// Merged location and ownership data for one address.
///
/// Every field is independently optional; partial results are common.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupResult {
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub asn: Option<u32>,
    pub org: Option<String>,
}

impl LookupResult {
    /// Check if no field is populated.
    pub fn is_empty(&self) -> bool {
        self.country_code.is_none()
            && self.region.is_none()
            && self.city.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.asn.is_none()
            && self.org.is_none()
    }
}

/// Encode a lookup result as `country|region|city|lat|lon|ASn|org`.
///
/// Missing values leave their slot empty, so the output always has
/// [`FIELD_COUNT`] slots. Coordinates are printed with six decimals.
///
/// # Examples
/// ```
/// use geoip_enrich::{encode, LookupResult};
///
/// let r = LookupResult {
///     country_code: Some("US".into()),
///     latitude: Some(37.751),
///     longitude: Some(-97.822),
///     asn: Some(15169),
///     ..Default::default()
/// };
/// assert_eq!(encode(&r), "US|||37.751000|-97.822000|AS15169|");
/// ```
pub fn encode(r: &LookupResult) -> String {
    let mut out = String::with_capacity(64);

    out.push_str(r.country_code.as_deref().unwrap_or(""));
    out.push(FIELD_SEPARATOR);
    out.push_str(r.region.as_deref().unwrap_or(""));
    out.push(FIELD_SEPARATOR);
    out.push_str(r.city.as_deref().unwrap_or(""));
    out.push(FIELD_SEPARATOR);
    if let Some(lat) = r.latitude {
        let _ = write!(out, "{:.6}", lat);
    }
    out.push(FIELD_SEPARATOR);
    if let Some(lon) = r.longitude {
        let _ = write!(out, "{:.6}", lon);
    }
    out.push(FIELD_SEPARATOR);
    if let Some(asn) = r.asn {
        let _ = write!(out, "AS{}", asn);
    }
    out.push(FIELD_SEPARATOR);
    out.push_str(r.org.as_deref().unwrap_or(""));

    out
}
