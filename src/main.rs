use adserver::api::{self, AppState};
use adserver::config::{Config, DatabaseBackend};
use adserver::geo::{GeoIpService, GeoResolver};
use adserver::redirect::{self, ClickRedirector};
use adserver::selection::{AdSelector, TrackingPolicy};
use adserver::storage::{PostgresStorage, SqliteStorage, Storage};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    // Geo lookup
    let geoip = GeoIpService::new(config.geo.geoip_db_path.as_deref())?;
    if geoip.is_enabled() {
        info!(
            "🌍 GeoIP database loaded from {}",
            config.geo.geoip_db_path.as_deref().unwrap_or_default()
        );
    } else {
        info!("🌍 No GeoIP database configured - only ads for ALL countries will be served");
    }
    info!("Trusted proxy mode: {:?}", config.geo.trusted_proxy_mode);
    let geo: Arc<dyn GeoResolver> = Arc::new(geoip);

    // Selection and click handling
    let tracking = config.tracking.policy();
    match &tracking {
        TrackingPolicy::Redirect { base_url } => {
            info!("🔗 Ad links go through the click redirector at {}", base_url)
        }
        TrackingPolicy::Direct => info!("🔗 Click tracking disabled - ads link directly"),
    }
    let selector = Arc::new(AdSelector::new(Arc::clone(&storage), tracking));
    let redirector = Arc::new(ClickRedirector::new(
        Arc::clone(&storage),
        config.tracking.default_destination_url.clone(),
    ));

    // Create routers
    let api_router = api::create_api_router(Arc::new(AppState {
        storage: Arc::clone(&storage),
        selector,
        redirector: Arc::clone(&redirector),
        geo,
        geo_config: config.geo.clone(),
        redirect_status: config.tracking.redirect_status,
    }));
    let redirect_router =
        redirect::create_redirect_router(redirector, config.tracking.redirect_status);

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API server to {api_addr}"))?;
    info!("🚀 Ad server listening on http://{}", api_addr);
    info!("   - Ad data at http://{}/page-data and /zone-data", api_addr);
    info!("   - Management API at http://{}/api/...", api_addr);

    // Start redirect server
    let redirect_addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr)
        .await
        .with_context(|| format!("failed to bind redirect server to {redirect_addr}"))?;
    info!("🚀 Click redirect server listening on http://{}", redirect_addr);

    // Run both servers concurrently
    tokio::try_join!(
        axum::serve(
            api_listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
        axum::serve(redirect_listener, redirect_router),
    )?;

    Ok(())
}
