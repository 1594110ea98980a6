use anyhow::Context;
use axum::http::StatusCode;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::selection::TrackingPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    pub tracking: TrackingConfig,
    pub geo: GeoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Route ad links through the click redirector
    pub enabled: bool,
    /// Public base URL of the redirect server
    pub redirect_base_url: String,
    /// Where a click goes when the ad has no URL (or does not exist)
    pub default_destination_url: String,
    pub redirect_status: RedirectStatus,
}

/// HTTP status used for click redirects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectStatus {
    #[default]
    Found,
    Temporary,
    Permanent,
}

impl RedirectStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "302" | "found" => Some(RedirectStatus::Found),
            "307" | "temporary" => Some(RedirectStatus::Temporary),
            "308" | "permanent" => Some(RedirectStatus::Permanent),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RedirectStatus::Found => StatusCode::FOUND,
            RedirectStatus::Temporary => StatusCode::TEMPORARY_REDIRECT,
            RedirectStatus::Permanent => StatusCode::PERMANENT_REDIRECT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Path to a GeoLite2-Country (or City) .mmdb file
    pub geoip_db_path: Option<String>,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Proxies whose forwarding headers are believed (Standard mode)
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    /// Fixed number of proxy hops in front of the server (Standard mode)
    pub num_trusted_proxies: Option<usize>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            geoip_db_path: None,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// Trust CF-Connecting-IP and CF-IPCountry
    Cloudflare,
    /// Trust Forwarded / X-Forwarded-For
    Standard,
}

impl TrackingConfig {
    pub fn policy(&self) -> TrackingPolicy {
        if self.enabled {
            TrackingPolicy::Redirect {
                base_url: self.redirect_base_url.trim_end_matches('/').to_string(),
            }
        } else {
            TrackingPolicy::Direct
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./adserver.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let redirect_host =
            std::env::var("REDIRECT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let redirect_port = std::env::var("REDIRECT_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()?;

        let redirect_base_url = std::env::var("REDIRECT_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let default_destination_url = std::env::var("DEFAULT_DESTINATION_URL")
            .unwrap_or_else(|_| "http://localhost:8080/".to_string());

        let redirect_status = match std::env::var("REDIRECT_STATUS") {
            Ok(raw) => RedirectStatus::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    "Unknown REDIRECT_STATUS '{raw}', falling back to 302. Supported values: 302, 307, 308"
                );
                RedirectStatus::Found
            }),
            Err(_) => RedirectStatus::Found,
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            "standard" => TrustedProxyMode::Standard,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, cloudflare, standard"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<IpNet>()
                            .with_context(|| format!("invalid CIDR in TRUSTED_PROXIES: {s}"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok());

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            tracking: TrackingConfig {
                enabled: env_flag("CLICK_TRACKING", true),
                redirect_base_url,
                default_destination_url,
                redirect_status,
            },
            geo: GeoConfig {
                geoip_db_path: std::env::var("GEOIP_DB_PATH").ok(),
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
        })
    }
}
