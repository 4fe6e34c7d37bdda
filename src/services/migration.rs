//! System basis migration
//!
//! Flips a station between router-local ("api") and centralized RADIUS
//! authentication. There is no transaction spanning the database, the RADIUS
//! directory and the router: the station row is persisted first as the
//! durable source of truth, every external push is best-effort, and the
//! procedure is safe to re-invoke after a partial failure: the persisted
//! identity is reused instead of regenerated.
//!
//! External failures are accumulated on the run summary. `warnings` holds
//! degraded-but-acceptable outcomes; `errors` holds items that must be
//! re-driven. Neither aborts the run; `success` is `errors.is_empty()`.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;

use crate::config::CONFIG;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::station::SystemBasis;
use crate::models::{package, platform_user, pppoe_entry, pppoe_plan, station, subscriber};
use crate::services::radius::{
    RadiusClientRequest, RadiusDirectory, RadiusUserRecord, RadiusUserStore,
};
use crate::services::router::{self, RouterBackendConfigurator, RouterConnection, RouterConnector};
use crate::services::security::generate_random_string;
use crate::state::DbConn;

// ============================================================================
// Run summary
// ============================================================================

/// Accumulated outcome of one migration run
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MigrationSummary {
    pub target: SystemBasis,
    pub station_updated: bool,
    pub router_configured: bool,
    pub users_migrated: usize,
    pub pppoe_migrated: usize,
    pub packages_updated: usize,
    pub radius_client_added: bool,
    pub radius_client_removed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub success: bool,
}

impl MigrationSummary {
    fn new(target: SystemBasis) -> Self {
        Self {
            target,
            station_updated: false,
            router_configured: false,
            users_migrated: 0,
            pppoe_migrated: 0,
            packages_updated: 0,
            radius_client_added: false,
            radius_client_removed: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            success: true,
        }
    }

    fn finalize(mut self) -> Self {
        self.success = self.errors.is_empty();
        self
    }
}

/// Network-facing collaborators driven by a migration run
pub struct MigrationBackends<'a> {
    pub router: &'a dyn RouterConnector,
    pub radius: &'a dyn RadiusDirectory,
    pub radius_users: &'a dyn RadiusUserStore,
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Symmetric rate-limit string for a package speed in Mbps
pub fn rate_limit_for_speed(speed_mbps: i32) -> String {
    format!("{}M/{}M", speed_mbps, speed_mbps)
}

/// Convert a usage string (`"<value> <unit>"`, binary multiples of 1024) into
/// a byte quota. `"Unlimited"` or an unrecognized unit yields `None`, never an
/// error.
pub fn usage_to_bytes(usage: &str) -> Option<i64> {
    let mut parts = usage.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let multiplier: i64 = match parts.next()?.to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        "TB" => 1024i64.pow(4),
        _ => return None,
    };
    Some((value * multiplier as f64) as i64)
}

/// Derive a rate limit from a PPPoE profile string by extracting its numeric
/// characters, e.g. `"profile-10M"` -> `"10M/10M"`.
pub fn profile_rate_limit(profile: &str) -> Option<String> {
    let digits: String = profile.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("{}M/{}M", digits, digits))
    }
}

/// Lowercased alphanumeric platform prefix for generated client names
fn platform_prefix(name: &str) -> String {
    let prefix: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .flat_map(char::to_lowercase)
        .take(8)
        .collect();
    if prefix.is_empty() {
        "platform".to_string()
    } else {
        prefix
    }
}

/// Generate a `rad-<platform-prefix>-<random>` client name, retrying until it
/// collides with none of the platform's existing names.
pub fn generate_radius_client_name(platform_name: &str, existing: &HashSet<String>) -> String {
    let prefix = platform_prefix(platform_name);
    loop {
        let candidate = format!("rad-{}-{}", prefix, generate_random_string(2));
        if !existing.contains(&candidate) {
            return candidate;
        }
    }
}

/// Resolve a public address for the station: DDNS hostname, declared public
/// host, then internal host; first literal IP or first successful DNS answer
/// wins. Failure is "address unknown", never an error.
pub async fn resolve_public_ip(station: &station::Model) -> Option<String> {
    let candidates = [
        station.ddns_hostname.as_deref(),
        station.public_host.as_deref(),
        Some(station.internal_host.as_str()),
    ];

    for host in candidates.into_iter().flatten() {
        let host = host.trim();
        if host.is_empty() {
            continue;
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip.to_string());
        }
        if let Ok(mut addrs) = tokio::net::lookup_host((host, 0u16)).await {
            if let Some(addr) = addrs.next() {
                return Some(addr.ip().to_string());
            }
        }
    }
    None
}

// ============================================================================
// Entry point
// ============================================================================

/// Migrate a station to the target basis and reconcile every dependent
/// record. Aborts before any change unless the caller is an active platform
/// superuser owning the station.
pub async fn migrate_station_basis(
    db: &DbConn,
    backends: &MigrationBackends<'_>,
    actor: &platform_user::Model,
    station_id: i64,
    target: SystemBasis,
) -> Result<MigrationSummary> {
    if !actor.is_active || !actor.is_superuser {
        return Err(AppError::Forbidden(
            "Platform superuser access required".to_string(),
        ));
    }

    let station = Station::find_by_id(station_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Station {} not found", station_id)))?;

    if station.platform_id != actor.platform_id {
        return Err(AppError::NotFound(format!(
            "Station {} not found",
            station_id
        )));
    }

    tracing::info!(
        "Migrating station {} ({}) to {} basis",
        station.id,
        station.name,
        target
    );

    match target {
        SystemBasis::Radius => migrate_to_radius(db, backends, station).await,
        SystemBasis::Api => migrate_to_api(db, backends, station).await,
    }
}

// ============================================================================
// Target = RADIUS
// ============================================================================

async fn migrate_to_radius(
    db: &DbConn,
    backends: &MigrationBackends<'_>,
    station: station::Model,
) -> Result<MigrationSummary> {
    let mut summary = MigrationSummary::new(SystemBasis::Radius);

    let platform = Platform::find_by_id(station.platform_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Station platform missing".to_string()))?;

    // Reuse a persisted identity so re-invocation stays idempotent
    let client_name = match &station.radius_client_name {
        Some(name) => name.clone(),
        None => {
            let existing: HashSet<String> = Station::find()
                .filter(station::Column::PlatformId.eq(station.platform_id))
                .all(db)
                .await?
                .into_iter()
                .filter_map(|s| s.radius_client_name)
                .collect();
            generate_radius_client_name(&platform.name, &existing)
        }
    };
    let client_secret = station
        .radius_client_secret
        .clone()
        .unwrap_or_else(|| generate_random_string(12));

    let public_ip = resolve_public_ip(&station).await;
    if public_ip.is_none() {
        summary.warnings.push(format!(
            "No reachable public address for station {}",
            station.name
        ));
    }

    let server_ip = station
        .radius_server_ip
        .clone()
        .or_else(|| CONFIG.radius.server_ip.clone());

    // Persist before any external push; the row is the durable source of truth
    let mut active: station::ActiveModel = station.clone().into();
    active.system_basis = Set(SystemBasis::Radius);
    active.radius_client_name = Set(Some(client_name.clone()));
    active.radius_client_secret = Set(Some(client_secret.clone()));
    active.radius_client_ip = Set(public_ip.clone());
    active.radius_server_ip = Set(server_ip.clone());
    active.updated_at = Set(Utc::now());
    let station = active.update(db).await?;
    summary.station_updated = true;

    // Directory registration needs both addresses
    if let (Some(ip), Some(server)) = (public_ip.as_deref(), server_ip.as_deref()) {
        let request = RadiusClientRequest {
            name: client_name.clone(),
            ip: ip.to_string(),
            secret: client_secret.clone(),
            shortname: client_name.clone(),
            server: Some(server.to_string()),
            description: Some(station.name.clone()),
        };
        match backends.radius.ensure_client(&request).await {
            Ok(()) => summary.radius_client_added = true,
            Err(e) => summary
                .warnings
                .push(format!("RADIUS client registration failed: {}", e)),
        }
    }

    // Router-side wiring
    match server_ip.as_deref() {
        Some(server) => {
            let configurator = RouterBackendConfigurator::new(backends.router);
            let push = configurator
                .configure_for_radius(&station, server, &client_secret)
                .await;
            if push.success {
                summary.router_configured = true;
            } else {
                summary.warnings.push(format!(
                    "Router RADIUS wiring failed: {}",
                    push.message.unwrap_or_default()
                ));
            }
        }
        None => summary
            .warnings
            .push("RADIUS server address unknown; router wiring skipped".to_string()),
    }

    // Subscribers on packages hosted at this station
    let packages: HashMap<i64, package::Model> = Package::find()
        .filter(package::Column::PlatformId.eq(station.platform_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let subscribers = Subscriber::find()
        .filter(subscriber::Column::PlatformId.eq(station.platform_id))
        .all(db)
        .await?;

    for sub in subscribers.iter().filter(|s| s.status == "active") {
        let Some(pkg) = packages.get(&sub.package_id) else {
            summary.warnings.push(format!(
                "Package {} for subscriber {} not found",
                sub.package_id, sub.username
            ));
            continue;
        };
        if pkg.router_host != station.internal_host {
            continue;
        }

        let data_limit = if pkg.category == "data" {
            usage_to_bytes(&pkg.usage)
        } else {
            None
        };
        let record = RadiusUserRecord {
            username: sub.username.clone(),
            password: sub.password.clone(),
            groupname: pkg.name.clone(),
            rate_limit: Some(rate_limit_for_speed(pkg.speed)),
            data_limit_bytes: data_limit,
        };
        match backends.radius_users.upsert_user(&record).await {
            Ok(()) => summary.users_migrated += 1,
            Err(e) => summary
                .warnings
                .push(format!("RADIUS upsert for {} failed: {}", sub.username, e)),
        }
    }

    // PPPoE entries terminated at this station
    let plans: HashMap<i64, pppoe_plan::Model> = PppoePlan::find()
        .filter(pppoe_plan::Column::PlatformId.eq(station.platform_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let entries = PppoeEntry::find()
        .filter(pppoe_entry::Column::PlatformId.eq(station.platform_id))
        .all(db)
        .await?;

    for entry in entries.iter().filter(|e| e.station == station.internal_host) {
        let plan = entry.plan_id.and_then(|id| plans.get(&id));
        let profile = plan.map(|p| p.profile.as_str()).unwrap_or(&entry.profile);
        let groupname = plan
            .map(|p| p.name.clone())
            .unwrap_or_else(|| entry.profile.clone());

        let record = RadiusUserRecord {
            username: entry.client_name.clone(),
            password: entry.client_password.clone(),
            groupname,
            rate_limit: profile_rate_limit(profile),
            data_limit_bytes: None,
        };
        match backends.radius_users.upsert_user(&record).await {
            Ok(()) => summary.pppoe_migrated += 1,
            Err(e) => summary.warnings.push(format!(
                "RADIUS upsert for PPPoE {} failed: {}",
                entry.client_name, e
            )),
        }
    }

    Ok(summary.finalize())
}

// ============================================================================
// Target = API
// ============================================================================

async fn migrate_to_api(
    db: &DbConn,
    backends: &MigrationBackends<'_>,
    station: station::Model,
) -> Result<MigrationSummary> {
    let mut summary = MigrationSummary::new(SystemBasis::Api);

    // Persist first; the RADIUS identity is kept for a later return migration
    let mut active: station::ActiveModel = station.clone().into();
    active.system_basis = Set(SystemBasis::Api);
    active.updated_at = Set(Utc::now());
    let station = active.update(db).await?;
    summary.station_updated = true;

    if let Some(name) = station.radius_client_name.as_deref() {
        match backends.radius.remove_client(name).await {
            Ok(outcome) => summary.radius_client_removed = outcome.removed,
            Err(e) => summary
                .warnings
                .push(format!("RADIUS client removal failed: {}", e)),
        }
    }

    let server_ip = station
        .radius_server_ip
        .clone()
        .or_else(|| CONFIG.radius.server_ip.clone());
    let configurator = RouterBackendConfigurator::new(backends.router);
    let push = configurator
        .configure_for_api(&station, server_ip.as_deref())
        .await;
    if push.success {
        summary.router_configured = true;
    } else {
        summary.warnings.push(format!(
            "Router API wiring failed: {}",
            push.message.unwrap_or_default()
        ));
    }

    // Platform data touching this station
    let packages: Vec<package::Model> = Package::find()
        .filter(package::Column::PlatformId.eq(station.platform_id))
        .filter(package::Column::RouterHost.eq(station.internal_host.clone()))
        .all(db)
        .await?;
    let package_ids: HashSet<i64> = packages.iter().map(|p| p.id).collect();

    let subscribers: Vec<subscriber::Model> = Subscriber::find()
        .filter(subscriber::Column::PlatformId.eq(station.platform_id))
        .all(db)
        .await?
        .into_iter()
        .filter(|s| package_ids.contains(&s.package_id))
        .collect();

    let entries: Vec<pppoe_entry::Model> = PppoeEntry::find()
        .filter(pppoe_entry::Column::PlatformId.eq(station.platform_id))
        .all(db)
        .await?
        .into_iter()
        .filter(|e| e.station == station.internal_host)
        .collect();

    // RADIUS user records are stale once the station is API-governed
    for sub in &subscribers {
        if let Err(e) = backends.radius_users.delete_user(&sub.username).await {
            summary.warnings.push(format!(
                "RADIUS delete for {} failed: {}",
                sub.username, e
            ));
        }
    }
    for entry in &entries {
        if let Err(e) = backends.radius_users.delete_user(&entry.client_name).await {
            summary.warnings.push(format!(
                "RADIUS delete for PPPoE {} failed: {}",
                entry.client_name, e
            ));
        }
    }

    // Rebuild router-local objects over one channel
    let mut conn = match backends.router.open(&station).await {
        Ok(conn) => conn,
        Err(e) => {
            summary.warnings.push(format!(
                "Router channel unavailable; local objects not rebuilt: {}",
                e
            ));
            return Ok(summary.finalize());
        }
    };
    let result = rebuild_local_objects(
        db,
        conn.as_mut(),
        &station,
        packages,
        &subscribers,
        &entries,
        &mut summary,
    )
    .await;
    conn.close().await;
    result?;

    Ok(summary.finalize())
}

/// Steps 5-8 of the API direction: address pools, profiles, hotspot users and
/// PPP secrets. Only database failures propagate; router failures land on the
/// summary.
async fn rebuild_local_objects(
    db: &DbConn,
    conn: &mut dyn RouterConnection,
    station: &station::Model,
    packages: Vec<package::Model>,
    subscribers: &[subscriber::Model],
    entries: &[pppoe_entry::Model],
    summary: &mut MigrationSummary,
) -> Result<()> {
    // Pool discovery, cached per router host for the duration of the run
    let mut pool_cache: HashMap<String, Option<String>> = HashMap::new();
    let mut resolved: Vec<package::Model> = Vec::with_capacity(packages.len());

    for pkg in packages {
        // homefibre packages never require a pool
        if pkg.pool.is_some() || pkg.category == "homefibre" {
            resolved.push(pkg);
            continue;
        }

        let pool = match pool_cache.get(&pkg.router_host) {
            Some(cached) => cached.clone(),
            None => {
                let discovered = match router::list_pools(conn).await {
                    Ok(rows) => rows.into_iter().find_map(|r| r.get("name").cloned()),
                    Err(e) => {
                        summary
                            .warnings
                            .push(format!("Pool discovery on {} failed: {}", pkg.router_host, e));
                        None
                    }
                };
                pool_cache.insert(pkg.router_host.clone(), discovered.clone());
                discovered
            }
        };

        match pool {
            Some(pool_name) => {
                let mut active: package::ActiveModel = pkg.clone().into();
                active.pool = Set(Some(pool_name));
                active.updated_at = Set(Utc::now());
                let updated = active.update(db).await?;
                summary.packages_updated += 1;
                resolved.push(updated);
            }
            None => {
                summary.warnings.push(format!(
                    "No address pool found on {} for package {}",
                    pkg.router_host, pkg.name
                ));
                resolved.push(pkg);
            }
        }
    }

    // (Re)create router-local profiles for every package with a resolved pool
    for pkg in resolved.iter().filter(|p| p.pool.is_some()) {
        if let Err(e) = ensure_hotspot_profile(conn, pkg).await {
            summary.warnings.push(format!(
                "Profile creation for package {} failed: {}",
                pkg.name, e
            ));
        }
    }

    let packages_by_id: HashMap<i64, &package::Model> =
        resolved.iter().map(|p| (p.id, p)).collect();

    // Reactivate router-local users for active subscribers. Item failures are
    // recorded and the run continues; re-invocation re-drives them.
    match conn.write("/ip/hotspot/user/print", &[]).await {
        Ok(existing_users) => {
            for sub in subscribers.iter().filter(|s| s.status == "active") {
                let Some(pkg) = packages_by_id.get(&sub.package_id) else {
                    continue;
                };
                let outcome =
                    ensure_hotspot_user(conn, &existing_users, sub, &pkg.name).await;
                if let Err(e) = outcome {
                    summary.errors.push(format!(
                        "Activating router user {} failed: {}",
                        sub.username, e
                    ));
                }
            }
        }
        Err(e) => summary
            .errors
            .push(format!("Listing router users failed: {}", e)),
    }

    // PPP secrets, fetched once per station
    let secrets = match router::list_secrets(conn).await {
        Ok(rows) => rows,
        Err(e) => {
            summary
                .warnings
                .push(format!("Listing PPP secrets failed: {}", e));
            return Ok(());
        }
    };

    for entry in entries {
        if let Err(e) = reconcile_pppoe_secret(conn, &secrets, entry).await {
            summary.warnings.push(format!(
                "PPP secret for {} failed: {}",
                entry.client_name, e
            ));
        }
    }

    Ok(())
}

async fn ensure_hotspot_profile(
    conn: &mut dyn RouterConnection,
    pkg: &package::Model,
) -> Result<()> {
    let pool = pkg.pool.as_deref().unwrap_or_default();
    let fields = [
        ("rate-limit", rate_limit_for_speed(pkg.speed)),
        ("address-pool", pool.to_string()),
        ("shared-users", pkg.devices.to_string()),
        ("comment", format!("{} / {}d", pkg.category, pkg.period)),
    ];

    let profiles = conn.write("/ip/hotspot/user/profile/print", &[]).await?;
    let existing = profiles
        .iter()
        .find(|row| row.get("name").map(String::as_str) == Some(pkg.name.as_str()));

    match existing.and_then(|row| row.get(".id")) {
        Some(id) => {
            let mut args: Vec<(&str, String)> = vec![(".id", id.clone())];
            args.extend(fields.iter().cloned());
            conn.write("/ip/hotspot/user/profile/set", &args).await?;
        }
        None => {
            let mut args: Vec<(&str, String)> = vec![("name", pkg.name.clone())];
            args.extend(fields.iter().cloned());
            conn.write("/ip/hotspot/user/profile/add", &args).await?;
        }
    }
    Ok(())
}

async fn ensure_hotspot_user(
    conn: &mut dyn RouterConnection,
    existing_users: &[router::RouterRow],
    sub: &subscriber::Model,
    profile: &str,
) -> Result<()> {
    let existing = existing_users
        .iter()
        .find(|row| row.get("name").map(String::as_str) == Some(sub.username.as_str()));

    match existing.and_then(|row| row.get(".id")) {
        Some(id) => {
            conn.write(
                "/ip/hotspot/user/set",
                &[
                    (".id", id.clone()),
                    ("password", sub.password.clone()),
                    ("profile", profile.to_string()),
                ],
            )
            .await?;
        }
        None => {
            conn.write(
                "/ip/hotspot/user/add",
                &[
                    ("name", sub.username.clone()),
                    ("password", sub.password.clone()),
                    ("profile", profile.to_string()),
                ],
            )
            .await?;
        }
    }
    Ok(())
}

async fn reconcile_pppoe_secret(
    conn: &mut dyn RouterConnection,
    secrets: &[router::RouterRow],
    entry: &pppoe_entry::Model,
) -> Result<()> {
    let existing = secrets
        .iter()
        .find(|row| row.get("name").map(String::as_str) == Some(entry.client_name.as_str()));

    match existing.and_then(|row| row.get(".id")) {
        Some(id) => {
            router::update_secret(
                conn,
                id,
                &[
                    ("password", entry.client_password.clone()),
                    ("profile", entry.profile.clone()),
                ],
            )
            .await?;
        }
        None => {
            let rows = router::add_secret(
                conn,
                &[
                    ("name", entry.client_name.clone()),
                    ("password", entry.client_password.clone()),
                    ("service", "pppoe".to_string()),
                    ("profile", entry.profile.clone()),
                ],
            )
            .await?;

            // Disabling needs the assigned identifier, so it cannot be folded
            // into the creation call.
            if entry.status != "active" {
                let id = rows
                    .first()
                    .and_then(|row| row.get("ret").or_else(|| row.get(".id")))
                    .cloned()
                    .ok_or_else(|| {
                        AppError::Router("secret created without an identifier".to_string())
                    })?;
                router::disable_secret(conn, &id).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_for_speed() {
        assert_eq!(rate_limit_for_speed(10), "10M/10M");
        assert_eq!(rate_limit_for_speed(250), "250M/250M");
    }

    #[test]
    fn test_usage_to_bytes_binary_units() {
        assert_eq!(usage_to_bytes("2 GB"), Some(2 * 1024i64.pow(3)));
        assert_eq!(usage_to_bytes("10 MB"), Some(10 * 1024i64.pow(2)));
        assert_eq!(usage_to_bytes("512 KB"), Some(512 * 1024));
        assert_eq!(usage_to_bytes("1 TB"), Some(1024i64.pow(4)));
        assert_eq!(usage_to_bytes("7 B"), Some(7));
    }

    #[test]
    fn test_usage_to_bytes_unrecognized() {
        assert_eq!(usage_to_bytes("Unlimited"), None);
        assert_eq!(usage_to_bytes("2 parsecs"), None);
        assert_eq!(usage_to_bytes(""), None);
        assert_eq!(usage_to_bytes("GB 2"), None);
    }

    #[test]
    fn test_profile_rate_limit_digit_extraction() {
        assert_eq!(profile_rate_limit("profile-10M"), Some("10M/10M".to_string()));
        assert_eq!(profile_rate_limit("25M/25M"), Some("2525M/2525M".to_string()));
        assert_eq!(profile_rate_limit("default"), None);
    }

    #[test]
    fn test_platform_prefix_sanitized() {
        assert_eq!(platform_prefix("Acme Fibre!"), "acmefibr");
        assert_eq!(platform_prefix(""), "platform");
    }

    #[test]
    fn test_generate_radius_client_name_avoids_existing() {
        let existing: HashSet<String> = HashSet::new();
        let name = generate_radius_client_name("Acme", &existing);
        assert!(name.starts_with("rad-acme-"));
        assert!(!existing.contains(&name));
    }
}
