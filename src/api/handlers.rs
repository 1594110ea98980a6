use axum::{
    extract::{rejection::FormRejection, ConnectInfo, Form, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use super::params::{absint, sanitize_callback};
use crate::config::{GeoConfig, RedirectStatus};
use crate::geo::{resolve_viewer, GeoLocation, GeoResolver};
use crate::redirect::handlers::redirect_response;
use crate::redirect::ClickRedirector;
use crate::selection::{render_ad_html, AdSelector, ZoneData};
use crate::storage::Storage;

pub const STATUS_OK: u16 = 200;
pub const STATUS_NO_CONTENT: u16 = 204;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub selector: Arc<AdSelector>,
    pub redirector: Arc<ClickRedirector>,
    pub geo: Arc<dyn GeoResolver>,
    pub geo_config: GeoConfig,
    pub redirect_status: RedirectStatus,
}

impl AppState {
    fn viewer(&self, headers: &HeaderMap, addr: SocketAddr) -> GeoLocation {
        resolve_viewer(headers, addr.ip(), &self.geo_config, self.geo.as_ref())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Query parameters shared by the public endpoints and the dispatcher
#[derive(Debug, Default, Deserialize)]
pub struct AdQuery {
    pub action: Option<String>,
    pub page_id: Option<String>,
    pub zone_id: Option<String>,
    pub ad_id: Option<String>,
    pub callback: Option<String>,
}

impl AdQuery {
    /// Fill parameters missing here from `fallback`.
    pub fn or(self, fallback: AdQuery) -> AdQuery {
        AdQuery {
            action: self.action.or(fallback.action),
            page_id: self.page_id.or(fallback.page_id),
            zone_id: self.zone_id.or(fallback.zone_id),
            ad_id: self.ad_id.or(fallback.ad_id),
            callback: self.callback.or(fallback.callback),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageDataResponse {
    pub status: u16,
    pub page_data: BTreeMap<i64, ZoneData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ZoneDataResponse {
    pub status: u16,
    pub zone_data: ZoneData,
}

/// Fetch page ad data
pub async fn page_data(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AdQuery>,
) -> Response {
    let viewer = state.viewer(&headers, addr);
    let body = page_payload(&state, absint(query.page_id.as_deref()), &viewer).await;
    json_or_jsonp(&body, sanitize_callback(query.callback.as_deref()))
}

/// Fetch zone ad data
pub async fn zone_data(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AdQuery>,
) -> Response {
    let viewer = state.viewer(&headers, addr);
    let body = zone_payload(&state, absint(query.zone_id.as_deref()), &viewer).await;
    json_or_jsonp(&body, sanitize_callback(query.callback.as_deref()))
}

/// Clickable HTML for one zone, empty when there is nothing to show
pub async fn zone_html(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AdQuery>,
) -> Html<String> {
    let viewer = state.viewer(&headers, addr);
    let body = zone_payload(&state, absint(query.zone_id.as_deref()), &viewer).await;
    Html(render_ad_html(body.zone_data.ad.as_ref()))
}

/// AJAX-style dispatcher: `?action=<name>` picks the operation
pub async fn ajax(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AdQuery>,
) -> Response {
    dispatch(&state, addr, &headers, query).await
}

/// POST form of the dispatcher; form fields win over query parameters.
pub async fn ajax_form(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AdQuery>,
    form: Result<Form<AdQuery>, FormRejection>,
) -> Response {
    let query = match form {
        Ok(Form(form)) => form.or(query),
        Err(_) => query,
    };
    dispatch(&state, addr, &headers, query).await
}

async fn dispatch(
    state: &AppState,
    addr: SocketAddr,
    headers: &HeaderMap,
    query: AdQuery,
) -> Response {
    let action = query.action.as_deref().unwrap_or_default();
    let callback = sanitize_callback(query.callback.as_deref());

    match action {
        "ad_server_page_data" | "ad_server_jsonp_page_data" => {
            let viewer = state.viewer(headers, addr);
            let body = page_payload(state, absint(query.page_id.as_deref()), &viewer).await;
            json_or_jsonp(&body, callback)
        }
        "ad_server_zone_data" | "ad_server_jsonp_zone_data" => {
            let viewer = state.viewer(headers, addr);
            let body = zone_payload(state, absint(query.zone_id.as_deref()), &viewer).await;
            json_or_jsonp(&body, callback)
        }
        "ad_server_redirect" => {
            let target = state.redirector.follow(absint(query.ad_id.as_deref())).await;
            redirect_response(
                &target.destination,
                state.redirector.default_destination(),
                state.redirect_status,
            )
        }
        _ => (StatusCode::BAD_REQUEST, "0").into_response(),
    }
}

async fn page_payload(state: &AppState, page_id: i64, viewer: &GeoLocation) -> PageDataResponse {
    let page_data = match state.selector.select_for_page(page_id, viewer).await {
        Ok(page_data) => page_data,
        Err(err) => {
            error!(page_id, error = %err, "failed to select page ads");
            BTreeMap::new()
        }
    };

    let status = if page_data.values().any(|zone| !zone.is_empty()) {
        STATUS_OK
    } else {
        STATUS_NO_CONTENT
    };

    PageDataResponse { status, page_data }
}

async fn zone_payload(state: &AppState, zone_id: i64, viewer: &GeoLocation) -> ZoneDataResponse {
    let ad = match state.selector.select_for_zone(zone_id, viewer).await {
        Ok(ad) => ad,
        Err(err) => {
            error!(zone_id, error = %err, "failed to select zone ad");
            None
        }
    };

    let status = if ad.is_some() {
        STATUS_OK
    } else {
        STATUS_NO_CONTENT
    };

    ZoneDataResponse {
        status,
        zone_data: ZoneData::from(ad),
    }
}

/// JSON, or `callback(<json>)` as JavaScript when a callback is given
pub(crate) fn json_or_jsonp<T: Serialize>(body: &T, callback: Option<&str>) -> Response {
    let Some(callback) = callback else {
        return Json(body).into_response();
    };

    match serde_json::to_string(body) {
        Ok(json) => (
            [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
            format!("{callback}({json})"),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to serialize JSONP body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
