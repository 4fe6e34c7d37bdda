//! System basis migration tests
//!
//! Covers:
//! - API → RADIUS: identity generation and persistence, subscriber and PPPoE
//!   reconciliation, quota conversion, idempotent re-invocation
//! - RADIUS → API: client removal, pool discovery, profile/user/secret rebuild
//! - Authorization: superuser and platform ownership gate every change
//! - Partial-failure semantics: warnings accumulate, the run completes

mod common;

use common::*;
use netpilot::error::AppError;
use netpilot::models::prelude::*;
use netpilot::models::station::SystemBasis;
use netpilot::services::migration::{migrate_station_basis, MigrationBackends};
use netpilot::services::radius::RadiusClientRequest;
use sea_orm::EntityTrait;
use std::collections::HashMap;

fn backends<'a>(router: &'a MockRouter, radius: &'a MockRadius) -> MigrationBackends<'a> {
    MigrationBackends {
        router,
        radius,
        radius_users: radius,
    }
}

// ============================================================================
// Target = RADIUS
// ============================================================================

#[tokio::test]
async fn test_api_to_radius_migrates_active_subscriber() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme Fibre").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station = set_radius_server_ip(&db, station, "198.51.100.5").await;

    let pkg = create_test_package(
        &db,
        platform.id,
        "Hotspot 10",
        "10.20.0.2",
        10,
        "Unlimited",
        "hotspot",
    )
    .await;
    create_test_subscriber(&db, platform.id, "alice", "active", pkg.id).await;
    // Subscribers elsewhere or inactive are not migrated
    create_test_subscriber(&db, platform.id, "bob", "suspended", pkg.id).await;

    let router = MockRouter::default();
    let radius = MockRadius::default();
    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap();

    assert_eq!(summary.users_migrated, 1);
    assert!(summary.errors.is_empty());
    assert!(summary.success);
    assert!(summary.station_updated);
    assert!(summary.router_configured);
    assert!(summary.radius_client_added);

    // Identity persisted on the station row
    let station = Station::find_by_id(station.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(station.system_basis, SystemBasis::Radius);
    let client_name = station.radius_client_name.clone().unwrap();
    assert!(client_name.starts_with("rad-acmefibr-"));
    assert!(station.radius_client_secret.is_some());
    // The internal host is a literal address, so resolution used it directly
    assert_eq!(station.radius_client_ip.as_deref(), Some("10.20.0.2"));

    // Directory holds the client; the user store holds only the active subscriber
    assert_eq!(radius.client_names(), vec![client_name]);
    let state = radius.state.lock();
    assert_eq!(state.users.len(), 1);
    let record = state.users.get("alice").unwrap();
    assert_eq!(record.groupname, "Hotspot 10");
    assert_eq!(record.rate_limit.as_deref(), Some("10M/10M"));
    assert!(record.data_limit_bytes.is_none());
}

#[tokio::test]
async fn test_radius_migration_is_idempotent() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station = set_radius_server_ip(&db, station, "198.51.100.5").await;

    let router = MockRouter::default();
    let radius = MockRadius::default();

    migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap();
    let first = Station::find_by_id(station.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();

    migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap();
    let second = Station::find_by_id(station.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();

    // Same persisted identity after both runs, no duplicate client
    assert_eq!(first.radius_client_name, second.radius_client_name);
    assert_eq!(first.radius_client_secret, second.radius_client_secret);
    assert_eq!(first.radius_client_ip, second.radius_client_ip);
    assert_eq!(radius.state.lock().clients.len(), 1);
}

#[tokio::test]
async fn test_two_stations_get_distinct_client_names() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let a = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let a = set_radius_server_ip(&db, a, "198.51.100.5").await;
    let b = create_test_station(&db, platform.id, "beta", "10.20.0.3").await;
    let b = set_radius_server_ip(&db, b, "198.51.100.5").await;

    let router = MockRouter::default();
    let radius = MockRadius::default();

    migrate_station_basis(&db, &backends(&router, &radius), &actor, a.id, SystemBasis::Radius)
        .await
        .unwrap();
    migrate_station_basis(&db, &backends(&router, &radius), &actor, b.id, SystemBasis::Radius)
        .await
        .unwrap();

    let a = Station::find_by_id(a.id).one(&db).await.unwrap().unwrap();
    let b = Station::find_by_id(b.id).one(&db).await.unwrap().unwrap();
    assert_ne!(a.radius_client_name, b.radius_client_name);
    assert_eq!(radius.state.lock().clients.len(), 2);
}

#[tokio::test]
async fn test_data_package_usage_becomes_byte_quota() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station = set_radius_server_ip(&db, station, "198.51.100.5").await;

    let data_pkg = create_test_package(
        &db,
        platform.id,
        "Data 2GB",
        "10.20.0.2",
        20,
        "2 GB",
        "data",
    )
    .await;
    create_test_subscriber(&db, platform.id, "carol", "active", data_pkg.id).await;

    let router = MockRouter::default();
    let radius = MockRadius::default();
    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap();

    assert_eq!(summary.users_migrated, 1);
    let state = radius.state.lock();
    let record = state.users.get("carol").unwrap();
    assert_eq!(record.data_limit_bytes, Some(2 * 1024i64.pow(3)));
    assert_eq!(record.rate_limit.as_deref(), Some("20M/20M"));
}

#[tokio::test]
async fn test_pppoe_entries_migrate_with_plan_rate_limit() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station = set_radius_server_ip(&db, station, "198.51.100.5").await;

    let plan = create_test_pppoe_plan(&db, platform.id, "Fibre 25", "25M").await;
    create_test_pppoe_entry(&db, platform.id, "10.20.0.2", "ppp-client", "active", Some(plan.id))
        .await;
    // Entry on another station is left alone
    create_test_pppoe_entry(&db, platform.id, "10.20.0.9", "other-client", "active", None).await;

    let router = MockRouter::default();
    let radius = MockRadius::default();
    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap();

    assert_eq!(summary.pppoe_migrated, 1);
    let state = radius.state.lock();
    let record = state.users.get("ppp-client").unwrap();
    assert_eq!(record.groupname, "Fibre 25");
    assert_eq!(record.rate_limit.as_deref(), Some("25M/25M"));
    assert!(!state.users.contains_key("other-client"));
}

#[tokio::test]
async fn test_radius_push_failures_are_warnings_not_fatal() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station = set_radius_server_ip(&db, station, "198.51.100.5").await;

    let pkg = create_test_package(
        &db,
        platform.id,
        "Hotspot 10",
        "10.20.0.2",
        10,
        "Unlimited",
        "hotspot",
    )
    .await;
    create_test_subscriber(&db, platform.id, "alice", "active", pkg.id).await;

    let router = MockRouter::failing();
    let radius = MockRadius::failing();
    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap();

    // Every external push degraded, yet the run completed
    assert!(!summary.warnings.is_empty());
    assert!(summary.success);
    assert!(!summary.router_configured);
    assert!(!summary.radius_client_added);
    assert_eq!(summary.users_migrated, 0);

    // Persist-before-push: the identity is durable despite the failures
    let station = Station::find_by_id(station.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(station.system_basis, SystemBasis::Radius);
    assert!(station.radius_client_name.is_some());
}

// ============================================================================
// Target = API
// ============================================================================

#[tokio::test]
async fn test_radius_to_api_with_zero_pools_warns_and_succeeds() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station =
        set_radius_identity(&db, station, "rad-acme-ab12", "shh", "198.51.100.5").await;

    create_test_package(
        &db,
        platform.id,
        "Hotspot 10",
        "10.20.0.2",
        10,
        "Unlimited",
        "hotspot",
    )
    .await;

    let router = MockRouter::default(); // zero address pools
    let radius = MockRadius::default();
    radius.state.lock().clients.insert(
        "rad-acme-ab12".to_string(),
        RadiusClientRequest {
            name: "rad-acme-ab12".to_string(),
            ip: "203.0.113.10".to_string(),
            secret: "shh".to_string(),
            shortname: "rad-acme-ab12".to_string(),
            server: None,
            description: None,
        },
    );

    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Api,
    )
    .await
    .unwrap();

    assert!(summary.success);
    assert_eq!(summary.packages_updated, 0);
    assert!(summary
        .warnings
        .iter()
        .any(|w| w.contains("No address pool")));
    assert!(summary.radius_client_removed);
    assert!(radius.client_names().is_empty());

    let station = Station::find_by_id(station.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(station.system_basis, SystemBasis::Api);

    // Every opened management channel was released
    let state = router.state.lock();
    assert_eq!(state.opens, state.closes);
}

#[tokio::test]
async fn test_api_migration_discovers_pool_and_rebuilds_local_objects() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station =
        set_radius_identity(&db, station, "rad-acme-ab12", "shh", "198.51.100.5").await;

    let pkg = create_test_package(
        &db,
        platform.id,
        "Hotspot 10",
        "10.20.0.2",
        10,
        "Unlimited",
        "hotspot",
    )
    .await;
    create_test_subscriber(&db, platform.id, "alice", "active", pkg.id).await;

    let router = MockRouter::with_pools(&["dhcp_pool1", "dhcp_pool2"]);
    let radius = MockRadius::default();

    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Api,
    )
    .await
    .unwrap();

    assert!(summary.success, "warnings: {:?}", summary.warnings);
    assert_eq!(summary.packages_updated, 1);
    assert!(summary.router_configured);

    // First discovered pool persisted on the package
    let pkg = Package::find_by_id(pkg.id).one(&db).await.unwrap().unwrap();
    assert_eq!(pkg.pool.as_deref(), Some("dhcp_pool1"));

    // Router-local profile and user recreated
    let state = router.state.lock();
    assert!(state
        .hotspot_user_profiles
        .iter()
        .any(|row| row.get("name").map(String::as_str) == Some("Hotspot 10")));
    assert!(state
        .hotspot_users
        .iter()
        .any(|row| row.get("name").map(String::as_str) == Some("alice")));

    // RADIUS user record deleted now that the router is API-governed
    assert!(radius.usernames().is_empty());
}

#[tokio::test]
async fn test_homefibre_packages_exempt_from_pool_requirement() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station =
        set_radius_identity(&db, station, "rad-acme-ab12", "shh", "198.51.100.5").await;

    create_test_package(
        &db,
        platform.id,
        "Home Fibre 50",
        "10.20.0.2",
        50,
        "Unlimited",
        "homefibre",
    )
    .await;

    let router = MockRouter::default(); // zero pools would warn for other categories
    let radius = MockRadius::default();

    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Api,
    )
    .await
    .unwrap();

    assert!(summary.success);
    assert_eq!(summary.packages_updated, 0);
    assert!(!summary.warnings.iter().any(|w| w.contains("address pool")));
}

#[tokio::test]
async fn test_api_migration_updates_existing_secret_and_disables_new_inactive() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station =
        set_radius_identity(&db, station, "rad-acme-ab12", "shh", "198.51.100.5").await;

    create_test_pppoe_entry(&db, platform.id, "10.20.0.2", "ppp-existing", "active", None).await;
    create_test_pppoe_entry(&db, platform.id, "10.20.0.2", "ppp-dormant", "disabled", None).await;

    let router = MockRouter::default();
    // Router already knows one of the secrets
    router.state.lock().ppp_secrets.push(HashMap::from([
        (".id".to_string(), "*S1".to_string()),
        ("name".to_string(), "ppp-existing".to_string()),
    ]));
    let radius = MockRadius::default();

    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Api,
    )
    .await
    .unwrap();
    assert!(summary.success, "warnings: {:?}", summary.warnings);

    let commands = router.command_names();
    // Existing secret updated in place, never re-added
    assert!(commands.iter().any(|c| c == "/ppp/secret/set"));

    // New secret created, then disabled by its assigned identifier
    let state = router.state.lock();
    let created = state
        .ppp_secrets
        .iter()
        .find(|row| row.get("name").map(String::as_str) == Some("ppp-dormant"))
        .expect("dormant secret created");
    assert_eq!(created.get("disabled").map(String::as_str), Some("true"));
    drop(state);
    assert!(commands.iter().any(|c| c == "/ppp/secret/disable"));
}

#[tokio::test]
async fn test_router_user_activation_failures_recorded_but_run_continues() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "admin", true).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;
    let station =
        set_radius_identity(&db, station, "rad-acme-ab12", "shh", "198.51.100.5").await;

    let pkg = create_test_package(
        &db,
        platform.id,
        "Hotspot 10",
        "10.20.0.2",
        10,
        "Unlimited",
        "hotspot",
    )
    .await;
    create_test_subscriber(&db, platform.id, "alice", "active", pkg.id).await;
    create_test_pppoe_entry(&db, platform.id, "10.20.0.2", "ppp-client", "active", None).await;

    let router = MockRouter::with_pools(&["dhcp_pool1"]);
    router
        .state
        .lock()
        .fail_commands
        .push("/ip/hotspot/user/add".to_string());
    let radius = MockRadius::default();

    let summary = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Api,
    )
    .await
    .unwrap();

    // The activation failure lands in errors, flipping success off,
    // but the remaining steps still ran
    assert!(!summary.errors.is_empty());
    assert!(!summary.success);
    assert!(router
        .command_names()
        .iter()
        .any(|c| c == "/ppp/secret/add"));
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_migration_requires_superuser() {
    let db = create_test_db().await;
    let platform = create_test_platform(&db, "Acme").await;
    let actor = create_test_user(&db, platform.id, "viewer", false).await;
    let station = create_test_station(&db, platform.id, "alpha", "10.20.0.2").await;

    let router = MockRouter::default();
    let radius = MockRadius::default();
    let err = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // No change was made
    let station = Station::find_by_id(station.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(station.system_basis, SystemBasis::Api);
    assert!(station.radius_client_name.is_none());
}

#[tokio::test]
async fn test_migration_rejects_foreign_station() {
    let db = create_test_db().await;
    let platform_a = create_test_platform(&db, "Acme").await;
    let platform_b = create_test_platform(&db, "Borealis").await;
    let actor = create_test_user(&db, platform_a.id, "admin", true).await;
    let station = create_test_station(&db, platform_b.id, "beta", "10.30.0.2").await;

    let router = MockRouter::default();
    let radius = MockRadius::default();
    let err = migrate_station_basis(
        &db,
        &backends(&router, &radius),
        &actor,
        station.id,
        SystemBasis::Radius,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let station = Station::find_by_id(station.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(station.system_basis, SystemBasis::Api);
}
