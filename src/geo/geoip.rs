//! GeoIP lookup service using a MaxMind GeoLite2/GeoIP2 MMDB
//!
//! Either a Country or a City database works: the City database is a
//! superset of Country data and only the country fields are decoded.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Where a viewer is, as far as we can tell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB"), uppercase
    pub country_code: Option<String>,

    /// Continent code (e.g., "EU", "NA")
    pub continent_code: Option<String>,
}

impl GeoLocation {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn in_country(code: &str) -> Self {
        Self {
            country_code: normalize_code(code),
            continent_code: None,
        }
    }

    pub fn country(&self) -> Option<&str> {
        self.country_code.as_deref()
    }
}

/// Uppercase a two-letter code, dropping anything that is not one
pub(crate) fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() == 2 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// Maps a network address to a location. Must not fail.
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> GeoLocation;
}

/// GeoIP lookup service backed by a memory-mapped MMDB file
#[derive(Clone)]
pub struct GeoIpService {
    reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Open the database at `path`, or build a service that resolves
    /// every address to an unknown location when `path` is `None`.
    pub fn new(path: Option<&str>) -> Result<Self> {
        let reader = if let Some(path) = path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        Ok(Self { reader })
    }

    pub fn is_enabled(&self) -> bool {
        self.reader.is_some()
    }

    /// Lookup the country and continent for an IP address
    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let mut geo_location = GeoLocation::unknown();

        let Some(ref reader) = self.reader else {
            return geo_location;
        };

        match reader.lookup(ip) {
            Ok(result) => match result.decode::<geoip2::Country>() {
                Ok(Some(country)) => {
                    geo_location.country_code = country.country.iso_code.and_then(normalize_code);
                    geo_location.continent_code =
                        country.continent.code.map(|s| s.to_ascii_uppercase());
                }
                Ok(None) => debug!(%ip, "address not found in GeoIP database"),
                Err(err) => debug!(%ip, error = %err, "failed to decode GeoIP record"),
            },
            Err(err) => debug!(%ip, error = %err, "GeoIP lookup failed"),
        }

        geo_location
    }
}

impl GeoResolver for GeoIpService {
    fn resolve(&self, ip: IpAddr) -> GeoLocation {
        self.lookup(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geoip_service_creation_invalid_path() {
        let result = GeoIpService::new(Some("/nonexistent/path.mmdb"));
        assert!(result.is_err());
    }

    #[test]
    fn test_without_database_everything_is_unknown() {
        let service = GeoIpService::new(None).unwrap();
        assert!(!service.is_enabled());
        let location = service.resolve("203.0.113.7".parse().unwrap());
        assert_eq!(location, GeoLocation::unknown());
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("fr").as_deref(), Some("FR"));
        assert_eq!(normalize_code(" de ").as_deref(), Some("DE"));
        assert_eq!(normalize_code("FRA"), None);
        assert_eq!(normalize_code(""), None);
    }
}
