use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::ClickRedirector;
use crate::api::params::absint;
use crate::config::RedirectStatus;

pub struct RedirectState {
    pub redirector: Arc<ClickRedirector>,
    pub redirect_status: RedirectStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClickQuery {
    pub ad_id: Option<String>,
}

/// Count the click and send the viewer on to the ad's destination
pub async fn click(
    State(state): State<Arc<RedirectState>>,
    Query(query): Query<ClickQuery>,
) -> Response {
    let ad_id = absint(query.ad_id.as_deref());
    let target = state.redirector.follow(ad_id).await;
    redirect_response(
        &target.destination,
        state.redirector.default_destination(),
        state.redirect_status,
    )
}

/// Build a redirect, falling back to `fallback` when `destination` cannot
/// be used as a header value.
pub(crate) fn redirect_response(
    destination: &str,
    fallback: &str,
    status: RedirectStatus,
) -> Response {
    let location = HeaderValue::from_str(destination).or_else(|err| {
        warn!(destination, error = %err, "unusable redirect destination, using default");
        HeaderValue::from_str(fallback)
    });

    match location {
        Ok(location) => (status.status_code(), [(header::LOCATION, location)]).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Invalid redirect destination").into_response(),
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
