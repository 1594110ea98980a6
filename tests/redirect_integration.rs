//! Redirect integration tests
//!
//! These tests verify that tracking URLs handed out with ad data lead back
//! to the ad's destination, that clicks are counted, and that anything
//! unresolvable lands on the default destination.

use adserver::catalog;
use adserver::config::RedirectStatus;
use adserver::geo::GeoLocation;
use adserver::models::{EntityKind, Relation};
use adserver::redirect::{self, ClickRedirector};
use adserver::selection::{AdSelector, TrackingPolicy};
use adserver::storage::{SqliteStorage, Storage};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

const DEFAULT_DESTINATION: &str = "http://publisher.test/";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn redirect_app(storage: &Arc<dyn Storage>, status: RedirectStatus) -> Router {
    let redirector = Arc::new(ClickRedirector::new(
        Arc::clone(storage),
        DEFAULT_DESTINATION,
    ));
    redirect::create_redirect_router(redirector, status)
}

async fn create_ad(storage: &Arc<dyn Storage>, url: Option<&str>) -> i64 {
    let mut meta = BTreeMap::from([("country".to_string(), "ALL".to_string())]);
    if let Some(url) = url {
        meta.insert("url".to_string(), url.to_string());
    }
    catalog::create_entity(storage.as_ref(), EntityKind::Ad, "Banner", &meta)
        .await
        .unwrap()
        .entity
        .id
}

async fn follow(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    (response.status(), location)
}

#[tokio::test]
async fn test_tracking_url_round_trip() {
    let storage = create_test_storage().await;
    let zone = catalog::create_entity(
        storage.as_ref(),
        EntityKind::Zone,
        "Sidebar",
        &BTreeMap::new(),
    )
    .await
    .unwrap()
    .entity
    .id;
    let ad = create_ad(&storage, Some("https://advertiser.example/offer?x=1")).await;
    storage.connect(Relation::AdToZone, ad, zone).await.unwrap();

    let selector = AdSelector::new(
        Arc::clone(&storage),
        TrackingPolicy::Redirect {
            base_url: "http://localhost:3000/".to_string(),
        },
    );
    let data = selector
        .select_for_zone(zone, &GeoLocation::unknown())
        .await
        .unwrap()
        .expect("ad selected");
    let tracking_url = data.tracking_url.expect("tracking url");
    assert_eq!(tracking_url, format!("http://localhost:3000/click?ad_id={ad}"));

    // The redirect router serves the path part of the tracking URL
    let path = tracking_url.trim_start_matches("http://localhost:3000");
    let (status, location) = follow(redirect_app(&storage, RedirectStatus::Found), path).await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location, "https://advertiser.example/offer?x=1");
    let entity = storage.get_entity(ad).await.unwrap().unwrap();
    assert_eq!(entity.clicks, 1);
}

#[tokio::test]
async fn test_ad_without_url_goes_to_default_destination() {
    let storage = create_test_storage().await;
    let ad = create_ad(&storage, None).await;

    let (status, location) = follow(
        redirect_app(&storage, RedirectStatus::Found),
        &format!("/click?ad_id={ad}"),
    )
    .await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location, DEFAULT_DESTINATION);
    // The ad exists, so the click still counts
    let entity = storage.get_entity(ad).await.unwrap().unwrap();
    assert_eq!(entity.clicks, 1);
}

#[tokio::test]
async fn test_unknown_or_non_ad_ids_go_to_default_destination() {
    let storage = create_test_storage().await;
    let zone = catalog::create_entity(
        storage.as_ref(),
        EntityKind::Zone,
        "Not an ad",
        &BTreeMap::new(),
    )
    .await
    .unwrap()
    .entity
    .id;
    let app = redirect_app(&storage, RedirectStatus::Found);

    for uri in [
        "/click".to_string(),
        "/click?ad_id=abc".to_string(),
        "/click?ad_id=987654".to_string(),
        format!("/click?ad_id={zone}"),
    ] {
        let (status, location) = follow(app.clone(), &uri).await;
        assert_eq!(status, StatusCode::FOUND, "{uri}");
        assert_eq!(location, DEFAULT_DESTINATION, "{uri}");
    }

    let entity = storage.get_entity(zone).await.unwrap().unwrap();
    assert_eq!(entity.clicks, 0);
}

#[tokio::test]
async fn test_redirect_status_is_configurable() {
    let storage = create_test_storage().await;
    let ad = create_ad(&storage, Some("https://advertiser.example/")).await;
    let uri = format!("/click?ad_id={ad}");

    for (setting, expected) in [
        (RedirectStatus::Found, StatusCode::FOUND),
        (RedirectStatus::Temporary, StatusCode::TEMPORARY_REDIRECT),
        (RedirectStatus::Permanent, StatusCode::PERMANENT_REDIRECT),
    ] {
        let (status, location) = follow(redirect_app(&storage, setting), &uri).await;
        assert_eq!(status, expected);
        assert_eq!(location, "https://advertiser.example/");
    }

    let entity = storage.get_entity(ad).await.unwrap().unwrap();
    assert_eq!(entity.clicks, 3);
}

#[tokio::test]
async fn test_concurrent_clicks_are_all_counted() {
    let storage = create_test_storage().await;
    let ad = create_ad(&storage, Some("https://advertiser.example/")).await;
    let app = redirect_app(&storage, RedirectStatus::Found);

    let mut handles = vec![];
    for _ in 0..20 {
        let app = app.clone();
        let uri = format!("/click?ad_id={ad}");
        handles.push(tokio::spawn(async move { follow(app, &uri).await }));
    }
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::FOUND);
    }

    let entity = storage.get_entity(ad).await.unwrap().unwrap();
    assert_eq!(entity.clicks, 20);
}

#[tokio::test]
async fn test_health_check() {
    let storage = create_test_storage().await;

    let response = redirect_app(&storage, RedirectStatus::Found)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
