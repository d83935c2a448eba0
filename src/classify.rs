//! IP address parsing and routability classification.

use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Classification of an address string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpClass {
    /// Empty or not an IP address
    Invalid,
    /// Globally routable, worth a database lookup
    Public,
    /// Private, loopback, reserved, link-local or multicast
    NonRoutable,
}

impl IpClass {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IpClass::Invalid => "invalid",
            IpClass::Public => "public",
            IpClass::NonRoutable => "non-routable",
        }
    }
}

impl fmt::Display for IpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn nets<T: std::str::FromStr>(cidrs: &[&str]) -> Vec<T>
where
    T::Err: fmt::Debug,
{
    cidrs
        .iter()
        .map(|c| c.parse().expect("static CIDR table"))
        .collect()
}

/// IPv4 ranges that never carry geolocation data.
static NON_ROUTABLE_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    nets(&[
        // private
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.0.2.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "198.51.100.0/24",
        "203.0.113.0/24",
        // loopback
        "127.0.0.0/8",
        // link-local
        "169.254.0.0/16",
        // multicast
        "224.0.0.0/4",
        // reserved, includes broadcast
        "240.0.0.0/4",
    ])
});

/// IPv6 ranges that never carry geolocation data.
static NON_ROUTABLE_V6: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    nets(&[
        // reserved by IETF, covers ::, ::1 and IPv4-mapped/compatible space
        "::/8",
        "100::/8",
        "200::/7",
        "400::/6",
        "800::/5",
        "1000::/4",
        "4000::/3",
        "6000::/3",
        "8000::/3",
        "a000::/3",
        "c000::/3",
        "e000::/4",
        "f000::/5",
        "f800::/6",
        "fe00::/9",
        // private
        "64:ff9b:1::/48",
        "2001::/23",
        "2001:db8::/32",
        "fc00::/7",
        // link-local and deprecated site-local
        "fe80::/10",
        "fec0::/10",
        // multicast
        "ff00::/8",
    ])
});

fn is_non_routable_v4(ip: Ipv4Addr) -> bool {
    NON_ROUTABLE_V4.iter().any(|net| net.contains(&ip))
}

fn is_non_routable_v6(ip: Ipv6Addr) -> bool {
    NON_ROUTABLE_V6.iter().any(|net| net.contains(&ip))
}

/// Parse an address after trimming surrounding whitespace.
pub fn parse_ip(s: &str) -> Option<IpAddr> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

/// Classify an already parsed address as public or non-routable.
pub fn classify_ip(ip: IpAddr) -> IpClass {
    let non_routable = match ip {
        IpAddr::V4(v4) => is_non_routable_v4(v4),
        IpAddr::V6(v6) => is_non_routable_v6(v6),
    };
    if non_routable {
        IpClass::NonRoutable
    } else {
        IpClass::Public
    }
}

/// Classify an address string.
///
/// # Examples
/// ```
/// use geoip_enrich::{classify, IpClass};
///
/// assert_eq!(classify(" 8.8.8.8 "), IpClass::Public);
/// assert_eq!(classify("192.168.1.10"), IpClass::NonRoutable);
/// assert_eq!(classify("not-an-ip"), IpClass::Invalid);
/// ```
pub fn classify(s: &str) -> IpClass {
    parse_ip(s).map_or(IpClass::Invalid, classify_ip)
}
