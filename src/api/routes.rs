use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers::{ajax, ajax_form, health_check, page_data, zone_data, zone_html, AppState};
use super::manage::{
    connect, connected, create_entity, delete_entity, disconnect, get_entity, list_entities,
    update_meta,
};
use super::static_files::serve_static;

pub fn create_api_router(state: Arc<AppState>) -> Router {
    // Ad data is fetched cross-origin from publisher pages
    let public_routes = Router::new()
        .route("/page-data", get(page_data))
        .route("/zone-data", get(zone_data))
        .route("/zone-html", get(zone_html))
        .route("/ajax", get(ajax).post(ajax_form))
        .route("/ad-server.js", get(serve_static))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    let manage_routes = Router::new()
        .route("/entities", post(create_entity).get(list_entities))
        .route("/entities/{id}", get(get_entity).delete(delete_entity))
        .route("/entities/{id}/meta", put(update_meta))
        .route("/entities/{id}/connected/{relation}", get(connected))
        .route("/connections", post(connect).delete(disconnect))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .nest("/api", manage_routes)
        .layer(TraceLayer::new_for_http())
}
