use std::net::SocketAddr;
use std::sync::Arc;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netpilot::config::CONFIG;
use netpilot::endpoints;
use netpilot::migrations::Migrator;
use netpilot::services::radius::RadiusApi;
use netpilot::services::router::RestRouterConnector;
use netpilot::services::tunnel::TunnelService;
use netpilot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netpilot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Netpilot backend v{}", env!("CARGO_PKG_VERSION"));

    // Connect to the database and run migrations
    let db = Database::connect(CONFIG.db_url()).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("Database connection established");

    // Tunnel reconciler over the shared WireGuard config file
    let tunnel = Arc::new(TunnelService::new(
        CONFIG.tunnel.config_path.clone(),
        CONFIG.tunnel.interface.clone(),
    ));
    tracing::info!(
        "Tunnel reconciler bound to {} ({})",
        CONFIG.tunnel.config_path.display(),
        CONFIG.tunnel.interface
    );

    // Router management transport (RouterOS REST bridge)
    let router = Arc::new(RestRouterConnector::new(
        CONFIG.router.username.clone(),
        CONFIG.router.password.clone(),
    ));

    // RADIUS provisioning API (client directory + user store)
    let radius = Arc::new(RadiusApi::new(
        CONFIG.radius.api_base.clone(),
        CONFIG.radius.api_token.clone(),
    ));

    let state = AppState {
        db,
        tunnel,
        router,
        radius: radius.clone(),
        radius_users: radius,
    };

    // Build the application
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], CONFIG.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the main application router
fn create_app(state: AppState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    endpoints::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
