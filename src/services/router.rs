//! Router management channel and RADIUS wiring
//!
//! The management channel is modeled as an opaque capability,
//! `write(command, args)` plus `close()`, so any transport (REST bridge,
//! SSH, a scripted driver in tests) can stand behind it. The production
//! transport speaks the RouterOS v7 REST API.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::station;

/// One row returned by a router command
pub type RouterRow = HashMap<String, String>;

/// Interim accounting update interval pushed to PPP AAA
const INTERIM_UPDATE: &str = "5m";

// ============================================================================
// Capability traits
// ============================================================================

/// An open management channel to one router
#[async_trait]
pub trait RouterConnection: Send {
    /// Execute one management command; `args` are property/value pairs.
    async fn write(&mut self, command: &str, args: &[(&str, String)]) -> Result<Vec<RouterRow>>;

    /// Release the channel. Called on every exit path, success or failure.
    async fn close(&mut self);
}

/// Opens management channels to station routers
#[async_trait]
pub trait RouterConnector: Send + Sync {
    async fn open(&self, station: &station::Model) -> Result<Box<dyn RouterConnection>>;
}

// ============================================================================
// RouterOS REST transport
// ============================================================================

// Shared client for router REST requests; routers ship self-signed certs
#[allow(clippy::expect_used)]
static ROUTER_HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .danger_accept_invalid_certs(true)
        .build()
        .expect("Failed to build router HTTP client")
});

/// Production connector: RouterOS v7 REST bridge over the tunnel address
pub struct RestRouterConnector {
    username: String,
    password: String,
}

impl RestRouterConnector {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

#[async_trait]
impl RouterConnector for RestRouterConnector {
    async fn open(&self, station: &station::Model) -> Result<Box<dyn RouterConnection>> {
        Ok(Box::new(RestRouterConnection {
            base: format!("https://{}/rest", station.internal_host),
            username: self.username.clone(),
            password: self.password.clone(),
        }))
    }
}

struct RestRouterConnection {
    base: String,
    username: String,
    password: String,
}

#[async_trait]
impl RouterConnection for RestRouterConnection {
    async fn write(&mut self, command: &str, args: &[(&str, String)]) -> Result<Vec<RouterRow>> {
        let url = format!("{}{}", self.base, command);

        let mut body = serde_json::Map::new();
        for (key, value) in args {
            body.insert((*key).to_string(), serde_json::Value::String(value.clone()));
        }

        let resp = ROUTER_HTTP_CLIENT
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Router(format!("{}: {}", command, e)))?;

        if !resp.status().is_success() {
            return Err(AppError::Router(format!(
                "{} returned {}",
                command,
                resp.status()
            )));
        }

        let value: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        Ok(rows_from_value(value))
    }

    async fn close(&mut self) {
        // HTTP transport holds no per-channel state
    }
}

/// Normalize a REST response into rows of string properties
fn rows_from_value(value: serde_json::Value) -> Vec<RouterRow> {
    let to_row = |obj: serde_json::Map<String, serde_json::Value>| -> RouterRow {
        obj.into_iter()
            .map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, s)
            })
            .collect()
    };

    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::Object(obj) => Some(to_row(obj)),
                _ => None,
            })
            .collect(),
        serde_json::Value::Object(obj) => vec![to_row(obj)],
        _ => vec![],
    }
}

// ============================================================================
// Command helpers shared with the migrator
// ============================================================================

pub async fn list_pools(conn: &mut dyn RouterConnection) -> Result<Vec<RouterRow>> {
    conn.write("/ip/pool/print", &[]).await
}

pub async fn list_secrets(conn: &mut dyn RouterConnection) -> Result<Vec<RouterRow>> {
    conn.write("/ppp/secret/print", &[]).await
}

pub async fn add_secret(
    conn: &mut dyn RouterConnection,
    fields: &[(&str, String)],
) -> Result<Vec<RouterRow>> {
    conn.write("/ppp/secret/add", fields).await
}

pub async fn update_secret(
    conn: &mut dyn RouterConnection,
    id: &str,
    fields: &[(&str, String)],
) -> Result<Vec<RouterRow>> {
    let mut args: Vec<(&str, String)> = vec![(".id", id.to_string())];
    args.extend(fields.iter().map(|(k, v)| (*k, v.clone())));
    conn.write("/ppp/secret/set", &args).await
}

/// The router only disables an existing secret by its assigned identifier, so
/// creation and disabling cannot be combined in one call.
pub async fn disable_secret(conn: &mut dyn RouterConnection, id: &str) -> Result<Vec<RouterRow>> {
    conn.write("/ppp/secret/disable", &[(".id", id.to_string())])
        .await
}

// ============================================================================
// Backend configurator
// ============================================================================

/// Outcome of a router wiring push
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RouterPushResult {
    pub success: bool,
    pub message: Option<String>,
}

impl RouterPushResult {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn failed(e: AppError) -> Self {
        Self {
            success: false,
            message: Some(e.to_string()),
        }
    }
}

/// Pushes RADIUS-on/off wiring to a station's router.
///
/// Both directions are idempotent and not transactional: a failure partway
/// leaves the router in a mixed state, remediated by re-invoking the same
/// operation.
pub struct RouterBackendConfigurator<'a> {
    connector: &'a dyn RouterConnector,
}

impl<'a> RouterBackendConfigurator<'a> {
    pub fn new(connector: &'a dyn RouterConnector) -> Self {
        Self { connector }
    }

    /// Wire the router to authenticate against the RADIUS server.
    pub async fn configure_for_radius(
        &self,
        station: &station::Model,
        radius_server_ip: &str,
        secret: &str,
    ) -> RouterPushResult {
        let mut conn = match self.connector.open(station).await {
            Ok(conn) => conn,
            Err(e) => return RouterPushResult::failed(e),
        };
        let result = radius_on(conn.as_mut(), radius_server_ip, secret).await;
        conn.close().await;
        match result {
            Ok(()) => RouterPushResult::ok(),
            Err(e) => RouterPushResult::failed(e),
        }
    }

    /// Symmetric reversal: strip RADIUS wiring so router-local profiles govern
    /// authentication again.
    pub async fn configure_for_api(
        &self,
        station: &station::Model,
        radius_server_ip: Option<&str>,
    ) -> RouterPushResult {
        let mut conn = match self.connector.open(station).await {
            Ok(conn) => conn,
            Err(e) => return RouterPushResult::failed(e),
        };
        let result = radius_off(conn.as_mut(), radius_server_ip).await;
        conn.close().await;
        match result {
            Ok(()) => RouterPushResult::ok(),
            Err(e) => RouterPushResult::failed(e),
        }
    }
}

async fn radius_on(
    conn: &mut dyn RouterConnection,
    server_ip: &str,
    secret: &str,
) -> Result<()> {
    // Update an existing server entry in place, or add one
    let entries = conn.write("/radius/print", &[]).await?;
    let existing = entries
        .iter()
        .find(|row| row.get("address").map(String::as_str) == Some(server_ip));

    match existing.and_then(|row| row.get(".id")) {
        Some(id) => {
            conn.write(
                "/radius/set",
                &[
                    (".id", id.clone()),
                    ("secret", secret.to_string()),
                    ("service", "ppp,hotspot".to_string()),
                    ("timeout", "300ms".to_string()),
                ],
            )
            .await?;
        }
        None => {
            conn.write(
                "/radius/add",
                &[
                    ("address", server_ip.to_string()),
                    ("secret", secret.to_string()),
                    ("service", "ppp,hotspot".to_string()),
                    ("timeout", "300ms".to_string()),
                ],
            )
            .await?;
        }
    }

    conn.write("/radius/incoming/set", &[("accept", "yes".to_string())])
        .await?;
    conn.write(
        "/ppp/aaa/set",
        &[
            ("use-radius", "yes".to_string()),
            ("accounting", "yes".to_string()),
            ("interim-update", INTERIM_UPDATE.to_string()),
        ],
    )
    .await?;

    let profiles = conn.write("/ip/hotspot/profile/print", &[]).await?;
    for profile in profiles {
        if let Some(id) = profile.get(".id") {
            conn.write(
                "/ip/hotspot/profile/set",
                &[(".id", id.clone()), ("use-radius", "yes".to_string())],
            )
            .await?;
        }
    }

    Ok(())
}

async fn radius_off(conn: &mut dyn RouterConnection, server_ip: Option<&str>) -> Result<()> {
    // Remove entries matching the known server address, or all when unknown
    let entries = conn.write("/radius/print", &[]).await?;
    for row in entries {
        let matches = match server_ip {
            Some(ip) => row.get("address").map(String::as_str) == Some(ip),
            None => true,
        };
        if matches {
            if let Some(id) = row.get(".id") {
                conn.write("/radius/remove", &[(".id", id.clone())]).await?;
            }
        }
    }

    conn.write("/radius/incoming/set", &[("accept", "no".to_string())])
        .await?;
    conn.write("/ppp/aaa/set", &[("use-radius", "no".to_string())])
        .await?;

    let profiles = conn.write("/ip/hotspot/profile/print", &[]).await?;
    for profile in profiles {
        if let Some(id) = profile.get(".id") {
            conn.write(
                "/ip/hotspot/profile/set",
                &[(".id", id.clone()), ("use-radius", "no".to_string())],
            )
            .await?;
        }
    }

    Ok(())
}
