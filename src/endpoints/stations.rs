//! Station provisioning and basis-migration endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::middleware::AuthenticatedUser;
use crate::models::station::{self, SystemBasis};
use crate::services::migration::{migrate_station_basis, MigrationBackends, MigrationSummary};
use crate::services::stations::{
    self, CreateStationRequest, StationBackends, StationProvisionResult, UpdateStationRequest,
};
use crate::state::AppState;

/// Create station routes
pub fn station_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_stations).post(create_station))
        .route(
            "/{id}",
            get(get_station).put(update_station).delete(delete_station),
        )
        .route("/{id}/migrate", post(migrate_station))
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct StationsResponse {
    stations: Vec<station::Model>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    success: bool,
    warnings: Vec<String>,
}

/// Request to migrate a station to a target authentication basis
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MigrateRequest {
    pub target: SystemBasis,
}

// ============================================================================
// Endpoints
// ============================================================================

/// List the platform's stations
async fn list_stations(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
) -> Result<Json<StationsResponse>> {
    let stations = stations::list_stations(&state.db, &actor).await?;
    Ok(Json(StationsResponse { stations }))
}

/// Get a station by ID
async fn get_station(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
) -> Result<Json<station::Model>> {
    let station = stations::get_station(&state.db, &actor, id).await?;
    Ok(Json(station))
}

/// Create a new station
async fn create_station(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Json(req): Json<CreateStationRequest>,
) -> Result<Json<StationProvisionResult>> {
    let backends = StationBackends {
        tunnel: state.tunnel.as_ref(),
        router: state.router.as_ref(),
        radius: state.radius.as_ref(),
    };
    let result = stations::create_station(&state.db, &backends, &actor, req).await?;
    Ok(Json(result))
}

/// Update a station
async fn update_station(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Json(req): Json<UpdateStationRequest>,
) -> Result<Json<StationProvisionResult>> {
    let backends = StationBackends {
        tunnel: state.tunnel.as_ref(),
        router: state.router.as_ref(),
        radius: state.radius.as_ref(),
    };
    let result = stations::update_station(&state.db, &backends, &actor, id, req).await?;
    Ok(Json(result))
}

/// Delete a station
async fn delete_station(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
) -> Result<Json<DeleteResponse>> {
    let backends = StationBackends {
        tunnel: state.tunnel.as_ref(),
        router: state.router.as_ref(),
        radius: state.radius.as_ref(),
    };
    let warnings = stations::delete_station(&state.db, &backends, &actor, id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        warnings,
    }))
}

/// Migrate a station between authentication bases
async fn migrate_station(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Json(req): Json<MigrateRequest>,
) -> Result<Json<MigrationSummary>> {
    let backends = MigrationBackends {
        router: state.router.as_ref(),
        radius: state.radius.as_ref(),
        radius_users: state.radius_users.as_ref(),
    };
    let summary = migrate_station_basis(&state.db, &backends, &actor, id, req.target).await?;
    Ok(Json(summary))
}
