//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, Set};

pub use netpilot::test_helpers::*;

use netpilot::models::station::{self, SystemBasis};
use netpilot::services::tunnel::TunnelService;
use netpilot::state::AppState;

/// Build an AppState over an in-memory database, mock network drivers and a
/// tunnel config inside the given temp directory.
pub async fn build_test_state(
    tmp: &tempfile::TempDir,
    router: MockRouter,
    radius: MockRadius,
) -> AppState {
    let db = create_test_db().await;
    let tunnel = Arc::new(TunnelService::new(
        tmp.path().join("wg0.conf"),
        "wg0".to_string(),
    ));
    let radius = Arc::new(radius);
    AppState {
        db,
        tunnel,
        router: Arc::new(router),
        radius: radius.clone(),
        radius_users: radius,
    }
}

/// Persist a RADIUS identity (and server address) on a station, as a previous
/// migration run would have.
pub async fn set_radius_identity(
    db: &sea_orm::DatabaseConnection,
    station: station::Model,
    client_name: &str,
    secret: &str,
    server_ip: &str,
) -> station::Model {
    let mut active: station::ActiveModel = station.into();
    active.system_basis = Set(SystemBasis::Radius);
    active.radius_client_name = Set(Some(client_name.to_string()));
    active.radius_client_secret = Set(Some(secret.to_string()));
    active.radius_client_ip = Set(Some("203.0.113.10".to_string()));
    active.radius_server_ip = Set(Some(server_ip.to_string()));
    active.update(db).await.unwrap()
}

/// Persist just the RADIUS server address on a station.
pub async fn set_radius_server_ip(
    db: &sea_orm::DatabaseConnection,
    station: station::Model,
    server_ip: &str,
) -> station::Model {
    let mut active: station::ActiveModel = station.into();
    active.radius_server_ip = Set(Some(server_ip.to_string()));
    active.update(db).await.unwrap()
}
