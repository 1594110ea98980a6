//! Viewer geolocation
//!
//! Resolves the requesting client to a country and continent so the ad
//! selector can apply per-country restrictions. Lookups never fail: any
//! problem yields an unknown location.

pub mod geoip;
pub mod ip_extractor;

pub use geoip::{GeoIpService, GeoLocation, GeoResolver};
pub use ip_extractor::{extract_client_ip, resolve_viewer};
