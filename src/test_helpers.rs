//! Test helpers and utilities for unit and integration testing.
//!
//! Provides an in-memory database, seed data builders and scripted drivers
//! for the router and RADIUS collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use crate::error::{AppError, Result};
use crate::migrations::Migrator;
use crate::models::station::SystemBasis;
use crate::models::{package, platform, platform_user, pppoe_entry, pppoe_plan, station, subscriber};
use crate::services::radius::{
    RadiusClientRequest, RadiusDirectory, RadiusRemoveOutcome, RadiusUserRecord, RadiusUserStore,
};
use crate::services::router::{RouterConnection, RouterConnector, RouterRow};

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    // Use simple in-memory SQLite - each connection gets its own database
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

// ============================================================================
// Seed data builders
// ============================================================================

pub async fn create_test_platform(db: &DatabaseConnection, name: &str) -> platform::Model {
    platform::ActiveModel {
        name: Set(name.to_string()),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_user(
    db: &DatabaseConnection,
    platform_id: i64,
    username: &str,
    is_superuser: bool,
) -> platform_user::Model {
    let now = chrono::Utc::now();
    platform_user::ActiveModel {
        platform_id: Set(platform_id),
        username: Set(username.to_string()),
        email: Set(format!("{}@example.net", username)),
        hashed_password: Set(crate::services::security::hash_password("password123").unwrap()),
        is_active: Set(true),
        is_superuser: Set(is_superuser),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_station(
    db: &DatabaseConnection,
    platform_id: i64,
    name: &str,
    internal_host: &str,
) -> station::Model {
    let now = chrono::Utc::now();
    station::ActiveModel {
        platform_id: Set(platform_id),
        name: Set(name.to_string()),
        internal_host: Set(internal_host.to_string()),
        system_basis: Set(SystemBasis::Api),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_package(
    db: &DatabaseConnection,
    platform_id: i64,
    name: &str,
    router_host: &str,
    speed: i32,
    usage: &str,
    category: &str,
) -> package::Model {
    let now = chrono::Utc::now();
    package::ActiveModel {
        platform_id: Set(platform_id),
        name: Set(name.to_string()),
        router_host: Set(router_host.to_string()),
        speed: Set(speed),
        period: Set(30),
        usage: Set(usage.to_string()),
        category: Set(category.to_string()),
        devices: Set(1),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_subscriber(
    db: &DatabaseConnection,
    platform_id: i64,
    username: &str,
    status: &str,
    package_id: i64,
) -> subscriber::Model {
    let now = chrono::Utc::now();
    subscriber::ActiveModel {
        platform_id: Set(platform_id),
        username: Set(username.to_string()),
        password: Set("sub-secret".to_string()),
        status: Set(status.to_string()),
        package_id: Set(package_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_pppoe_plan(
    db: &DatabaseConnection,
    platform_id: i64,
    name: &str,
    profile: &str,
) -> pppoe_plan::Model {
    pppoe_plan::ActiveModel {
        platform_id: Set(platform_id),
        name: Set(name.to_string()),
        profile: Set(profile.to_string()),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_pppoe_entry(
    db: &DatabaseConnection,
    platform_id: i64,
    station_host: &str,
    client_name: &str,
    status: &str,
    plan_id: Option<i64>,
) -> pppoe_entry::Model {
    let now = chrono::Utc::now();
    pppoe_entry::ActiveModel {
        platform_id: Set(platform_id),
        station: Set(station_host.to_string()),
        client_name: Set(client_name.to_string()),
        client_password: Set("ppp-secret".to_string()),
        profile: Set("default".to_string()),
        plan_id: Set(plan_id),
        status: Set(status.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

// ============================================================================
// Scripted router driver
// ============================================================================

/// Observable state behind the mock router transport
#[derive(Default)]
pub struct MockRouterState {
    /// Address pools reported by `/ip/pool/print`
    pub pools: Vec<String>,
    pub radius_entries: Vec<RouterRow>,
    pub hotspot_server_profiles: Vec<RouterRow>,
    pub hotspot_user_profiles: Vec<RouterRow>,
    pub hotspot_users: Vec<RouterRow>,
    pub ppp_secrets: Vec<RouterRow>,
    /// Every command written, in order
    pub commands: Vec<(String, Vec<(String, String)>)>,
    /// When set, every write fails
    pub fail_all: bool,
    /// Writes whose command starts with any of these prefixes fail
    pub fail_commands: Vec<String>,
    pub opens: usize,
    pub closes: usize,
    next_id: u32,
}

impl MockRouterState {
    fn assign_id(&mut self) -> String {
        self.next_id += 1;
        format!("*{:X}", self.next_id)
    }
}

/// Scripted in-memory router satisfying the management-channel capability
#[derive(Default, Clone)]
pub struct MockRouter {
    pub state: Arc<Mutex<MockRouterState>>,
}

impl MockRouter {
    pub fn with_pools(pools: &[&str]) -> Self {
        let router = Self::default();
        router.state.lock().pools = pools.iter().map(|p| (*p).to_string()).collect();
        router
    }

    pub fn failing() -> Self {
        let router = Self::default();
        router.state.lock().fail_all = true;
        router
    }

    /// Commands written so far, names only
    pub fn command_names(&self) -> Vec<String> {
        self.state
            .lock()
            .commands
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl RouterConnector for MockRouter {
    async fn open(&self, _station: &station::Model) -> Result<Box<dyn RouterConnection>> {
        let mut state = self.state.lock();
        if state.fail_all {
            return Err(AppError::Router("simulated channel failure".to_string()));
        }
        state.opens += 1;
        drop(state);
        Ok(Box::new(MockRouterConnection {
            state: self.state.clone(),
        }))
    }
}

struct MockRouterConnection {
    state: Arc<Mutex<MockRouterState>>,
}

#[async_trait]
impl RouterConnection for MockRouterConnection {
    async fn write(&mut self, command: &str, args: &[(&str, String)]) -> Result<Vec<RouterRow>> {
        let mut state = self.state.lock();
        if state.fail_all
            || state
                .fail_commands
                .iter()
                .any(|prefix| command.starts_with(prefix.as_str()))
        {
            return Err(AppError::Router(format!(
                "simulated write failure: {}",
                command
            )));
        }
        state.commands.push((
            command.to_string(),
            args.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect(),
        ));

        let row_from_args = |id: String, args: &[(&str, String)]| -> RouterRow {
            let mut row: RouterRow = args
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect();
            row.insert(".id".to_string(), id);
            row
        };

        let rows = match command {
            "/radius/print" => state.radius_entries.clone(),
            "/radius/add" => {
                let id = state.assign_id();
                let row = row_from_args(id.clone(), args);
                state.radius_entries.push(row);
                vec![HashMap::from([("ret".to_string(), id)])]
            }
            "/radius/remove" => {
                if let Some((_, id)) = args.iter().find(|(k, _)| *k == ".id") {
                    state
                        .radius_entries
                        .retain(|row| row.get(".id") != Some(id));
                }
                vec![]
            }
            "/ip/pool/print" => state
                .pools
                .clone()
                .into_iter()
                .enumerate()
                .map(|(i, name)| {
                    HashMap::from([
                        (".id".to_string(), format!("*P{}", i)),
                        ("name".to_string(), name),
                    ])
                })
                .collect(),
            "/ip/hotspot/profile/print" => state.hotspot_server_profiles.clone(),
            "/ip/hotspot/user/profile/print" => state.hotspot_user_profiles.clone(),
            "/ip/hotspot/user/profile/add" => {
                let id = state.assign_id();
                let row = row_from_args(id.clone(), args);
                state.hotspot_user_profiles.push(row);
                vec![HashMap::from([("ret".to_string(), id)])]
            }
            "/ip/hotspot/user/print" => state.hotspot_users.clone(),
            "/ip/hotspot/user/add" => {
                let id = state.assign_id();
                let row = row_from_args(id.clone(), args);
                state.hotspot_users.push(row);
                vec![HashMap::from([("ret".to_string(), id)])]
            }
            "/ppp/secret/print" => state.ppp_secrets.clone(),
            "/ppp/secret/add" => {
                let id = state.assign_id();
                let row = row_from_args(id.clone(), args);
                state.ppp_secrets.push(row);
                vec![HashMap::from([("ret".to_string(), id)])]
            }
            "/ppp/secret/disable" => {
                if let Some((_, id)) = args.iter().find(|(k, _)| *k == ".id") {
                    let id = id.clone();
                    for row in state.ppp_secrets.iter_mut() {
                        if row.get(".id") == Some(&id) {
                            row.insert("disabled".to_string(), "true".to_string());
                        }
                    }
                }
                vec![]
            }
            // set/remove variants and AAA toggles mutate nothing observable
            _ => vec![],
        };
        Ok(rows)
    }

    async fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}

// ============================================================================
// Scripted RADIUS driver
// ============================================================================

#[derive(Default)]
pub struct MockRadiusState {
    pub clients: HashMap<String, RadiusClientRequest>,
    pub users: HashMap<String, RadiusUserRecord>,
    /// When set, every call fails
    pub fail: bool,
}

/// In-memory RADIUS directory and user store
#[derive(Default, Clone)]
pub struct MockRadius {
    pub state: Arc<Mutex<MockRadiusState>>,
}

impl MockRadius {
    pub fn failing() -> Self {
        let radius = Self::default();
        radius.state.lock().fail = true;
        radius
    }

    pub fn client_names(&self) -> Vec<String> {
        self.state.lock().clients.keys().cloned().collect()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.state.lock().users.keys().cloned().collect()
    }
}

#[async_trait]
impl RadiusDirectory for MockRadius {
    async fn ensure_client(&self, client: &RadiusClientRequest) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(AppError::ServiceUnavailable(
                "simulated RADIUS failure".to_string(),
            ));
        }
        state.clients.insert(client.name.clone(), client.clone());
        Ok(())
    }

    async fn remove_client(&self, name: &str) -> Result<RadiusRemoveOutcome> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(AppError::ServiceUnavailable(
                "simulated RADIUS failure".to_string(),
            ));
        }
        let removed = state.clients.remove(name).is_some();
        Ok(RadiusRemoveOutcome { removed })
    }
}

#[async_trait]
impl RadiusUserStore for MockRadius {
    async fn upsert_user(&self, user: &RadiusUserRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(AppError::ServiceUnavailable(
                "simulated RADIUS failure".to_string(),
            ));
        }
        state.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(AppError::ServiceUnavailable(
                "simulated RADIUS failure".to_string(),
            ));
        }
        state.users.remove(username);
        Ok(())
    }
}
