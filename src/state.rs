use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::services::radius::{RadiusDirectory, RadiusUserStore};
use crate::services::router::RouterConnector;
use crate::services::tunnel::TunnelService;

/// Database connection type alias
pub type DbConn = DatabaseConnection;

/// Application state containing all shared resources
///
/// The network-facing collaborators are held as trait objects so that tests
/// (and alternative transports) can substitute their own drivers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub tunnel: Arc<TunnelService>,
    pub router: Arc<dyn RouterConnector>,
    pub radius: Arc<dyn RadiusDirectory>,
    pub radius_users: Arc<dyn RadiusUserStore>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_db, MockRadius, MockRouter};

    #[tokio::test]
    async fn test_app_state_clone_shares_resources() {
        let db = create_test_db().await;
        let tunnel = Arc::new(TunnelService::new("/tmp/wg-test.conf".into(), "wg0".into()));
        let radius = Arc::new(MockRadius::default());

        let state = AppState {
            db,
            tunnel: tunnel.clone(),
            router: Arc::new(MockRouter::default()),
            radius: radius.clone(),
            radius_users: radius,
        };
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.tunnel, &cloned.tunnel));
    }
}
