//! RADIUS directory and user store
//!
//! Registers station routers as RADIUS clients (NAS entries) and maintains
//! per-subscriber user records through the provisioning API exposed on the
//! RADIUS host. Both concerns are capability traits so the migrator never
//! couples to the transport; the production implementation is an HTTP client.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// Shared reqwest client for RADIUS provisioning requests
#[allow(clippy::expect_used)]
static RADIUS_HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("Failed to build RADIUS HTTP client")
});

// ============================================================================
// Records
// ============================================================================

/// Request to register a RADIUS client (NAS entry) for a station router
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RadiusClientRequest {
    pub name: String,
    /// Public address the router's RADIUS traffic originates from
    pub ip: String,
    pub secret: String,
    pub shortname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A subscriber record in the RADIUS user store
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RadiusUserRecord {
    pub username: String,
    pub password: String,
    /// Group name; the package (or plan) the subscriber is on
    pub groupname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_limit_bytes: Option<i64>,
}

/// Outcome of a client removal
#[derive(Debug, Clone)]
pub struct RadiusRemoveOutcome {
    pub removed: bool,
}

// ============================================================================
// Capability traits
// ============================================================================

/// Client (NAS) registry on the RADIUS server
#[async_trait]
pub trait RadiusDirectory: Send + Sync {
    /// Register the client, updating it in place when the name already exists.
    async fn ensure_client(&self, client: &RadiusClientRequest) -> Result<()>;

    /// Remove the client; removing an absent client is not an error.
    async fn remove_client(&self, name: &str) -> Result<RadiusRemoveOutcome>;
}

/// Per-subscriber user records on the RADIUS server
#[async_trait]
pub trait RadiusUserStore: Send + Sync {
    async fn upsert_user(&self, user: &RadiusUserRecord) -> Result<()>;

    /// Delete the user record; deleting an absent user is not an error.
    async fn delete_user(&self, username: &str) -> Result<()>;
}

// ============================================================================
// Provisioning API response envelope
// ============================================================================

#[derive(Deserialize)]
struct ApiResponse<T> {
    success: bool,
    message: Option<String>,
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, context: &str) -> Result<Option<T>> {
        if !self.success {
            let msg = self.message.as_deref().unwrap_or("unknown error");
            return Err(AppError::ServiceUnavailable(format!(
                "RADIUS API error ({}): {}",
                context, msg
            )));
        }
        Ok(self.result)
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// HTTP client for the provisioning API on the RADIUS host
pub struct RadiusApi {
    base: String,
    token: String,
}

impl RadiusApi {
    pub fn new(base: String, token: String) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        RADIUS_HTTP_CLIENT
            .request(method, format!("{}{}", self.base, path))
            .bearer_auth(&self.token)
    }
}

#[async_trait]
impl RadiusDirectory for RadiusApi {
    async fn ensure_client(&self, client: &RadiusClientRequest) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PUT, &format!("/clients/{}", client.name))
            .json(client)
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API: {}", e)))?;

        let envelope: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API parse: {}", e)))?;
        envelope.into_result("ensure client")?;
        Ok(())
    }

    async fn remove_client(&self, name: &str) -> Result<RadiusRemoveOutcome> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/clients/{}", name))
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(RadiusRemoveOutcome { removed: false });
        }

        #[derive(Deserialize)]
        struct Removed {
            removed: bool,
        }

        let envelope: ApiResponse<Removed> = resp
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API parse: {}", e)))?;
        let removed = envelope
            .into_result("remove client")?
            .map(|r| r.removed)
            .unwrap_or(true);
        Ok(RadiusRemoveOutcome { removed })
    }
}

#[async_trait]
impl RadiusUserStore for RadiusApi {
    async fn upsert_user(&self, user: &RadiusUserRecord) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PUT, &format!("/users/{}", user.username))
            .json(user)
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API: {}", e)))?;

        let envelope: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API parse: {}", e)))?;
        envelope.into_result("upsert user")?;
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/users/{}", username))
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        let envelope: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("RADIUS API parse: {}", e)))?;
        envelope.into_result("delete user")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_request_skips_absent_fields() {
        let req = RadiusClientRequest {
            name: "rad-acme-a1b2".to_string(),
            ip: "203.0.113.10".to_string(),
            secret: "s3cret".to_string(),
            shortname: "rad-acme-a1b2".to_string(),
            server: None,
            description: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["name"], "rad-acme-a1b2");
        assert!(!json.as_object().unwrap().contains_key("server"));
        assert!(!json.as_object().unwrap().contains_key("description"));
    }

    #[test]
    fn test_user_record_serialization() {
        let user = RadiusUserRecord {
            username: "alice".to_string(),
            password: "pw".to_string(),
            groupname: "Hotspot 10".to_string(),
            rate_limit: Some("10M/10M".to_string()),
            data_limit_bytes: Some(2 * 1024 * 1024 * 1024),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["rate_limit"], "10M/10M");
        assert_eq!(json["data_limit_bytes"], 2_147_483_648i64);
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let api = RadiusApi::new("http://radius:8180/api/".to_string(), "t".to_string());
        assert_eq!(api.base, "http://radius:8180/api");
    }
}
