use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::RedirectStatus;

use super::handlers::{click, health_check, RedirectState};
use super::ClickRedirector;

pub fn create_redirect_router(
    redirector: Arc<ClickRedirector>,
    redirect_status: RedirectStatus,
) -> Router {
    let state = Arc::new(RedirectState {
        redirector,
        redirect_status,
    });

    Router::new()
        .route("/", get(health_check))
        .route("/click", get(click))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
