//! Client IP extraction from HTTP headers with trust validation
//!
//! - Cloudflare mode reads CF-Connecting-IP, and CF-IPCountry short-cuts
//!   the database lookup
//! - Standard mode reads Forwarded, then X-Forwarded-For, walking the
//!   chain right to left past trusted proxies
//! - Otherwise, or when headers are missing, the socket address is used

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use super::geoip::{normalize_code, GeoLocation, GeoResolver};
use crate::config::{GeoConfig, TrustedProxyMode};

/// Resolve the requesting viewer's location
pub fn resolve_viewer(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &GeoConfig,
    resolver: &dyn GeoResolver,
) -> GeoLocation {
    let client_ip = extract_client_ip(headers, socket_addr, config);

    if config.trusted_proxy_mode == TrustedProxyMode::Cloudflare {
        if let Some(country) = cloudflare_country(headers) {
            let mut location = resolver.resolve(client_ip);
            if location.country_code.as_deref() != Some(country.as_str()) {
                location.continent_code = None;
            }
            location.country_code = Some(country);
            return location;
        }
    }

    resolver.resolve(client_ip)
}

/// Extract the client IP address according to the trust configuration
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr, config: &GeoConfig) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            extract_standard_ip(headers, socket_addr, config).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// CF-IPCountry, ignoring Cloudflare's "XX" (unknown) and "T1" (Tor)
fn cloudflare_country(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("cf-ipcountry")?.to_str().ok()?;
    normalize_code(raw).filter(|code| code != "XX" && code != "T1")
}

fn extract_standard_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &GeoConfig,
) -> Option<IpAddr> {
    // Headers from an untrusted peer are ignored outright
    if !config.trusted_proxies.is_empty() && !is_trusted(socket_addr, config) {
        return None;
    }

    let chain = forwarded_chain(headers);
    let chain = if chain.is_empty() {
        x_forwarded_for_chain(headers)
    } else {
        chain
    };

    pick_from_chain(&chain, config)
}

fn is_trusted(ip: IpAddr, config: &GeoConfig) -> bool {
    config.trusted_proxies.iter().any(|net| net.contains(&ip))
}

/// Choose the client from a proxy chain ordered client-first
fn pick_from_chain(ips: &[IpAddr], config: &GeoConfig) -> Option<IpAddr> {
    if ips.is_empty() {
        return None;
    }

    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        return ips.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !is_trusted(**ip, config))
            .or_else(|| ips.first())
            .copied();
    }

    ips.last().copied()
}

/// `for=` values of an RFC 7239 Forwarded header
fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    let Some(forwarded) = headers.get("forwarded").and_then(|h| h.to_str().ok()) else {
        return vec![];
    };

    forwarded
        .split(',')
        .flat_map(|element| element.split(';'))
        .filter_map(|param| {
            let param = param.trim();
            let (name, value) = param.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("for") {
                return None;
            }
            parse_node(value.trim().trim_matches('"'))
        })
        .collect()
}

/// Parse a node such as `192.0.2.60`, `192.0.2.60:4711` or `[2001:db8::1]:4711`
fn parse_node(node: &str) -> Option<IpAddr> {
    if let Some(rest) = node.strip_prefix('[') {
        let (addr, _) = rest.split_once(']')?;
        return addr.parse().ok();
    }
    if let Ok(ip) = node.parse::<IpAddr>() {
        return Some(ip);
    }
    let (addr, _port) = node.rsplit_once(':')?;
    addr.parse().ok()
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    let Some(xff) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) else {
        return vec![];
    };

    xff.split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    struct FixedResolver(GeoLocation);

    impl GeoResolver for FixedResolver {
        fn resolve(&self, _ip: IpAddr) -> GeoLocation {
            self.0.clone()
        }
    }

    fn create_config(mode: TrustedProxyMode) -> GeoConfig {
        GeoConfig {
            trusted_proxy_mode: mode,
            ..Default::default()
        }
    }

    fn socket() -> IpAddr {
        "192.168.1.1".parse().unwrap()
    }

    #[test]
    fn test_extract_client_ip_none_mode() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::None);

        assert_eq!(extract_client_ip(&headers, socket(), &config), socket());
    }

    #[test]
    fn test_extract_cloudflare_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::Cloudflare);

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_extract_x_forwarded_for_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        // Rightmost IP in the absence of trust configuration
        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "198.51.100.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 10.0.0.5, 10.0.0.6"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.trusted_proxies = vec!["10.0.0.0/8".parse().unwrap()];

        let proxy: IpAddr = "10.0.0.7".parse().unwrap();
        let result = extract_client_ip(&headers, proxy, &config);
        assert_eq!(result, "203.0.113.1".parse::<IpAddr>().unwrap());

        // Same headers from an untrusted peer are ignored
        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, socket());
    }

    #[test]
    fn test_num_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1, 198.51.100.2"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(1);

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "198.51.100.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_header_with_ipv6_and_port() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static("for=\"[2001:db8:cafe::17]:4711\";proto=https"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, socket(), &config);
        assert_eq!(result, "2001:db8:cafe::17".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_parse_node_variants() {
        assert_eq!(parse_node("192.0.2.60"), "192.0.2.60".parse().ok());
        assert_eq!(parse_node("192.0.2.60:8080"), "192.0.2.60".parse().ok());
        assert_eq!(parse_node("2001:db8::1"), "2001:db8::1".parse().ok());
        assert_eq!(parse_node("unknown"), None);
    }

    #[test]
    fn test_cloudflare_country_overrides_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("fr"));
        let config = create_config(TrustedProxyMode::Cloudflare);
        let resolver = FixedResolver(GeoLocation {
            country_code: Some("DE".to_string()),
            continent_code: Some("EU".to_string()),
        });

        let viewer = resolve_viewer(&headers, socket(), &config, &resolver);
        assert_eq!(viewer.country(), Some("FR"));
        assert_eq!(viewer.continent_code, None);
    }

    #[test]
    fn test_cloudflare_unknown_country_falls_back_to_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", HeaderValue::from_static("XX"));
        let config = create_config(TrustedProxyMode::Cloudflare);
        let resolver = FixedResolver(GeoLocation::in_country("DE"));

        let viewer = resolve_viewer(&headers, socket(), &config, &resolver);
        assert_eq!(viewer.country(), Some("DE"));
    }

    #[test]
    fn test_country_header_ignored_outside_cloudflare_mode() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", HeaderValue::from_static("FR"));
        let config = create_config(TrustedProxyMode::None);
        let resolver = FixedResolver(GeoLocation::unknown());

        let viewer = resolve_viewer(&headers, socket(), &config, &resolver);
        assert_eq!(viewer.country(), None);
    }
}
