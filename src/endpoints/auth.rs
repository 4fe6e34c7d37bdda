//! Session endpoints: bearer-token login

use axum::{extract::State, routing::post, Json, Router};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::platform_user;
use crate::models::prelude::*;
use crate::services::security::{create_access_token, verify_password};
use crate::state::AppState;

/// Create auth routes
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: i64,
    pub username: String,
    pub platform_id: i64,
    pub is_superuser: bool,
}

// ============================================================================
// Endpoints
// ============================================================================

/// Login with username and password, returns a bearer token
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    // Find user by username or email
    let found_user = PlatformUser::find()
        .filter(
            platform_user::Column::Username
                .eq(&request.username)
                .or(platform_user::Column::Email.eq(&request.username)),
        )
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    if !found_user.is_active {
        return Err(AppError::Unauthorized("Account is disabled".to_string()));
    }

    if !verify_password(&request.password, &found_user.hashed_password) {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let access_token = create_access_token(
        &found_user.id.to_string(),
        Some(&found_user.email),
        None,
    )?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user_id: found_user.id,
        username: found_user.username,
        platform_id: found_user.platform_id,
        is_superuser: found_user.is_superuser,
    }))
}
