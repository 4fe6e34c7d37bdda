//! Station lifecycle
//!
//! Create/update keep the station reachable over the tunnel mesh; stations on
//! RADIUS basis additionally get their router wiring and directory
//! registration re-pushed (best-effort, surfaced as warnings). Delete
//! reverses the tunnel peer and the RADIUS registration.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::CONFIG;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::station::{self, SystemBasis};
use crate::models::platform_user;
use crate::services::radius::{RadiusClientRequest, RadiusDirectory};
use crate::services::router::{RouterBackendConfigurator, RouterConnector};
use crate::services::tunnel::TunnelService;
use crate::state::DbConn;

/// Network-facing collaborators driven by station lifecycle operations
pub struct StationBackends<'a> {
    pub tunnel: &'a TunnelService,
    pub router: &'a dyn RouterConnector,
    pub radius: &'a dyn RadiusDirectory,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a station
#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateStationRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1))]
    pub internal_host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ddns_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel_public_key: Option<String>,
    #[serde(default)]
    pub system_basis: Option<SystemBasis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_server_ip: Option<String>,
}

/// Request to update a station; absent fields are left unchanged
#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateStationRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub internal_host: Option<String>,
    pub public_host: Option<String>,
    pub ddns_hostname: Option<String>,
    pub tunnel_public_key: Option<String>,
    pub radius_server_ip: Option<String>,
}

/// A provisioned station plus any degraded external pushes
#[derive(Debug, Clone, Serialize)]
pub struct StationProvisionResult {
    pub station: station::Model,
    pub warnings: Vec<String>,
}

// ============================================================================
// Queries
// ============================================================================

/// List the caller's platform stations
pub async fn list_stations(
    db: &DbConn,
    actor: &platform_user::Model,
) -> Result<Vec<station::Model>> {
    let stations = Station::find()
        .filter(station::Column::PlatformId.eq(actor.platform_id))
        .all(db)
        .await?;
    Ok(stations)
}

/// Get a station owned by the caller's platform
pub async fn get_station(
    db: &DbConn,
    actor: &platform_user::Model,
    id: i64,
) -> Result<station::Model> {
    find_owned(db, actor, id).await
}

// ============================================================================
// Mutations
// ============================================================================

/// Create a station and reconcile its tunnel peer
pub async fn create_station(
    db: &DbConn,
    backends: &StationBackends<'_>,
    actor: &platform_user::Model,
    req: CreateStationRequest,
) -> Result<StationProvisionResult> {
    require_superuser(actor)?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let now = Utc::now();
    let new_station = station::ActiveModel {
        platform_id: Set(actor.platform_id),
        name: Set(req.name),
        internal_host: Set(req.internal_host),
        public_host: Set(req.public_host),
        ddns_hostname: Set(req.ddns_hostname),
        tunnel_public_key: Set(req.tunnel_public_key),
        system_basis: Set(req.system_basis.unwrap_or(SystemBasis::Api)),
        radius_server_ip: Set(req.radius_server_ip),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let station = new_station.insert(db).await?;

    // Tunnel reachability is a hard requirement for a managed station
    backends.tunnel.ensure_peer(&station).await?;

    let mut warnings = Vec::new();
    if station.system_basis == SystemBasis::Radius {
        wire_radius(backends, &station, &mut warnings).await;
    }

    Ok(StationProvisionResult { station, warnings })
}

/// Update a station, re-reconciling the tunnel peer when its mesh identity
/// changed
pub async fn update_station(
    db: &DbConn,
    backends: &StationBackends<'_>,
    actor: &platform_user::Model,
    id: i64,
    req: UpdateStationRequest,
) -> Result<StationProvisionResult> {
    require_superuser(actor)?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let station = find_owned(db, actor, id).await?;
    let previous = station.clone();

    let mut active: station::ActiveModel = station.into();
    if let Some(name) = req.name {
        active.name = Set(name);
    }
    if let Some(internal_host) = req.internal_host {
        active.internal_host = Set(internal_host);
    }
    if let Some(public_host) = req.public_host {
        active.public_host = Set(Some(public_host));
    }
    if let Some(ddns_hostname) = req.ddns_hostname {
        active.ddns_hostname = Set(Some(ddns_hostname));
    }
    if let Some(tunnel_public_key) = req.tunnel_public_key {
        active.tunnel_public_key = Set(Some(tunnel_public_key));
    }
    if let Some(radius_server_ip) = req.radius_server_ip {
        active.radius_server_ip = Set(Some(radius_server_ip));
    }
    active.updated_at = Set(Utc::now());
    let station = active.update(db).await?;

    let identity_changed = previous.internal_host != station.internal_host
        || previous.tunnel_public_key != station.tunnel_public_key;
    let endpoint_changed = previous.public_host != station.public_host
        || previous.ddns_hostname != station.ddns_hostname;

    if identity_changed {
        // The old peer block would otherwise linger under its old identity
        backends.tunnel.remove_peer(&previous).await?;
    }
    if identity_changed || endpoint_changed {
        backends.tunnel.ensure_peer(&station).await?;
    }

    let mut warnings = Vec::new();
    if station.system_basis == SystemBasis::Radius {
        wire_radius(backends, &station, &mut warnings).await;
    }

    Ok(StationProvisionResult { station, warnings })
}

/// Delete a station, reversing its tunnel peer and RADIUS registration
pub async fn delete_station(
    db: &DbConn,
    backends: &StationBackends<'_>,
    actor: &platform_user::Model,
    id: i64,
) -> Result<Vec<String>> {
    require_superuser(actor)?;
    let station = find_owned(db, actor, id).await?;

    backends.tunnel.remove_peer(&station).await?;

    let mut warnings = Vec::new();
    if let Some(name) = station.radius_client_name.as_deref() {
        if let Err(e) = backends.radius.remove_client(name).await {
            tracing::warn!("Failed to remove RADIUS client {}: {}", name, e);
            warnings.push(format!("RADIUS client removal failed: {}", e));
        }
    }

    Station::delete_by_id(station.id).exec(db).await?;
    Ok(warnings)
}

// ============================================================================
// Helpers
// ============================================================================

fn require_superuser(actor: &platform_user::Model) -> Result<()> {
    if actor.is_active && actor.is_superuser {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Platform superuser access required".to_string(),
        ))
    }
}

async fn find_owned(
    db: &DbConn,
    actor: &platform_user::Model,
    id: i64,
) -> Result<station::Model> {
    let station = Station::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Station {} not found", id)))?;
    if station.platform_id != actor.platform_id {
        return Err(AppError::NotFound(format!("Station {} not found", id)));
    }
    Ok(station)
}

/// Re-push RADIUS wiring for a station already carrying an identity; degraded
/// pushes become warnings.
async fn wire_radius(
    backends: &StationBackends<'_>,
    station: &station::Model,
    warnings: &mut Vec<String>,
) {
    let server_ip = station
        .radius_server_ip
        .clone()
        .or_else(|| CONFIG.radius.server_ip.clone());

    let Some(secret) = station.radius_client_secret.as_deref() else {
        warnings.push(
            "Station is on RADIUS basis without an identity; run a basis migration".to_string(),
        );
        return;
    };

    match server_ip.as_deref() {
        Some(server) => {
            let configurator = RouterBackendConfigurator::new(backends.router);
            let push = configurator
                .configure_for_radius(station, server, secret)
                .await;
            if !push.success {
                warnings.push(format!(
                    "Router RADIUS wiring failed: {}",
                    push.message.unwrap_or_default()
                ));
            }
        }
        None => warnings.push("RADIUS server address unknown; router wiring skipped".to_string()),
    }

    if let (Some(name), Some(ip), Some(server)) = (
        station.radius_client_name.as_deref(),
        station.radius_client_ip.as_deref(),
        server_ip.as_deref(),
    ) {
        let request = RadiusClientRequest {
            name: name.to_string(),
            ip: ip.to_string(),
            secret: secret.to_string(),
            shortname: name.to_string(),
            server: Some(server.to_string()),
            description: Some(station.name.clone()),
        };
        if let Err(e) = backends.radius.ensure_client(&request).await {
            warnings.push(format!("RADIUS client registration failed: {}", e));
        }
    }
}
