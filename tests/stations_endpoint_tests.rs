//! Station endpoint integration tests
//!
//! Covers:
//! - `POST /auth/login` - bearer-token issuance
//! - Auth enforcement on `/api/stations`
//! - Station CRUD, platform scoping and superuser gating
//! - `POST /api/stations/{id}/migrate` - basis migration over the HTTP surface

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use common::*;
use netpilot::endpoints::create_router;
use netpilot::services::security::create_access_token;
use netpilot::state::AppState;

// ============================================================================
// Helpers
// ============================================================================

async fn fresh_state(router: MockRouter, radius: MockRadius) -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let state = build_test_state(&tmp, router, radius).await;
    (state, tmp)
}

fn bearer(user_id: i64) -> String {
    let token = create_access_token(&user_id.to_string(), None, None).unwrap();
    format!("Bearer {}", token)
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

// ============================================================================
// Health & auth
// ============================================================================

#[tokio::test]
async fn test_health_check_is_public() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_returns_bearer_token() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform = create_test_platform(&db, "Acme").await;
    create_test_user(&db, platform.id, "admin", true).await;

    let (status, json) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({"username": "admin", "password": "password123"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["token_type"], "bearer");
    assert_eq!(json["is_superuser"], true);
    assert!(json["access_token"].as_str().unwrap().len() > 20);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform = create_test_platform(&db, "Acme").await;
    create_test_user(&db, platform.id, "admin", true).await;

    let (status, _) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({"username": "admin", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stations_require_authentication() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let app = create_router(state);

    let (status, _) = send(app, "GET", "/api/stations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Station CRUD
// ============================================================================

#[tokio::test]
async fn test_station_crud_lifecycle() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform = create_test_platform(&db, "Acme").await;
    let admin = create_test_user(&db, platform.id, "admin", true).await;
    let auth = bearer(admin.id);

    // Create
    let (status, json) = send(
        app.clone(),
        "POST",
        "/api/stations",
        Some(&auth),
        Some(serde_json::json!({"name": "alpha", "internal_host": "10.20.0.2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["station"]["name"], "alpha");
    assert_eq!(json["station"]["system_basis"], "api");
    let id = json["station"]["id"].as_i64().unwrap();

    // List
    let (status, json) = send(app.clone(), "GET", "/api/stations", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stations"].as_array().unwrap().len(), 1);

    // Get
    let (status, json) = send(
        app.clone(),
        "GET",
        &format!("/api/stations/{}", id),
        Some(&auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["internal_host"], "10.20.0.2");

    // Update
    let (status, json) = send(
        app.clone(),
        "PUT",
        &format!("/api/stations/{}", id),
        Some(&auth),
        Some(serde_json::json!({"name": "alpha-renamed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["station"]["name"], "alpha-renamed");

    // Delete
    let (status, json) = send(
        app.clone(),
        "DELETE",
        &format!("/api/stations/{}", id),
        Some(&auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, _) = send(
        app,
        "GET",
        &format!("/api/stations/{}", id),
        Some(&auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_station_mutation_requires_superuser() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform = create_test_platform(&db, "Acme").await;
    let viewer = create_test_user(&db, platform.id, "viewer", false).await;
    let auth = bearer(viewer.id);

    let (status, _) = send(
        app,
        "POST",
        "/api/stations",
        Some(&auth),
        Some(serde_json::json!({"name": "alpha", "internal_host": "10.20.0.2"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_station_create_rejects_empty_name() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform = create_test_platform(&db, "Acme").await;
    let admin = create_test_user(&db, platform.id, "admin", true).await;
    let auth = bearer(admin.id);

    let (status, _) = send(
        app,
        "POST",
        "/api/stations",
        Some(&auth),
        Some(serde_json::json!({"name": "", "internal_host": "10.20.0.2"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stations_are_platform_scoped() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform_a = create_test_platform(&db, "Acme").await;
    let platform_b = create_test_platform(&db, "Borealis").await;
    let admin_a = create_test_user(&db, platform_a.id, "admin-a", true).await;
    let foreign = create_test_station(&db, platform_b.id, "beta", "10.30.0.2").await;

    let auth = bearer(admin_a.id);

    let (status, json) = send(app.clone(), "GET", "/api/stations", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["stations"].as_array().unwrap().is_empty());

    let (status, _) = send(
        app,
        "GET",
        &format!("/api/stations/{}", foreign.id),
        Some(&auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Basis migration endpoint
// ============================================================================

#[tokio::test]
async fn test_migrate_endpoint_flips_basis() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform = create_test_platform(&db, "Acme").await;
    let admin = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station = set_radius_server_ip(&db, station, "198.51.100.5").await;
    let auth = bearer(admin.id);

    let (status, json) = send(
        app.clone(),
        "POST",
        &format!("/api/stations/{}/migrate", station.id),
        Some(&auth),
        Some(serde_json::json!({"target": "radius"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["target"], "radius");
    assert_eq!(json["success"], true);
    assert_eq!(json["station_updated"], true);
    assert!(json["errors"].as_array().unwrap().is_empty());

    let (status, json) = send(
        app,
        "GET",
        &format!("/api/stations/{}", station.id),
        Some(&auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["system_basis"], "radius");
    assert!(json["radius_client_name"].as_str().is_some());
}

#[tokio::test]
async fn test_migrate_endpoint_rejects_invalid_target() {
    let (state, _tmp) = fresh_state(MockRouter::default(), MockRadius::default()).await;
    let db = state.db.clone();
    let app = create_router(state);

    let platform = create_test_platform(&db, "Acme").await;
    let admin = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let auth = bearer(admin.id);

    let (status, _) = send(
        app,
        "POST",
        &format!("/api/stations/{}/migrate", station.id),
        Some(&auth),
        Some(serde_json::json!({"target": "ldap"})),
    )
    .await;
    // Unknown basis never deserializes
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
