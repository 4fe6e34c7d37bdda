use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Database
    pub db_path: PathBuf,

    pub tunnel: TunnelConfig,
    pub router: RouterConfig,
    pub radius: RadiusConfig,
    pub auth: AuthConfig,

    // Build info
    pub commit_hash: String,
    pub build_time: String,
    pub version: String,

    // Logging
    pub log_level: String,
}

/// Shared VPN mesh configuration
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Path to the WireGuard configuration file holding one peer block per station
    pub config_path: PathBuf,
    /// Interface name passed to `wg-quick` on restart
    pub interface: String,
}

/// Router management channel credentials (RouterOS REST bridge)
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub username: String,
    pub password: String,
}

/// RADIUS provisioning API
#[derive(Debug, Clone)]
pub struct RadiusConfig {
    pub api_base: String,
    pub api_token: String,
    /// Address routers point their AAA at; used when a station has none persisted
    pub server_ip: Option<String>,
}

/// JWT signing keys
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_private_key_path: PathBuf,
    pub jwt_public_key_path: PathBuf,
    pub issuer_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            // Server
            host: env::var("NETPILOT_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("NETPILOT_API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            // Database
            db_path: PathBuf::from(
                env::var("NETPILOT_DB_PATH").unwrap_or_else(|_| "/data/netpilot.db".to_string()),
            ),

            tunnel: TunnelConfig {
                config_path: PathBuf::from(
                    env::var("NETPILOT_TUNNEL_CONFIG")
                        .unwrap_or_else(|_| "/etc/wireguard/wg0.conf".to_string()),
                ),
                interface: env::var("NETPILOT_TUNNEL_INTERFACE")
                    .unwrap_or_else(|_| "wg0".to_string()),
            },

            router: RouterConfig {
                username: env::var("NETPILOT_ROUTER_USER").unwrap_or_else(|_| "admin".to_string()),
                password: env::var("NETPILOT_ROUTER_PASSWORD").unwrap_or_default(),
            },

            radius: RadiusConfig {
                api_base: env::var("NETPILOT_RADIUS_API_BASE")
                    .unwrap_or_else(|_| "http://localhost:8180/api".to_string()),
                api_token: env::var("NETPILOT_RADIUS_API_TOKEN").unwrap_or_default(),
                server_ip: env::var("NETPILOT_RADIUS_SERVER_IP").ok(),
            },

            auth: AuthConfig {
                jwt_private_key_path: PathBuf::from(
                    env::var("NETPILOT_JWT_PRIVATE_KEY_PATH")
                        .unwrap_or_else(|_| "/secrets/jwt-private.pem".to_string()),
                ),
                jwt_public_key_path: PathBuf::from(
                    env::var("NETPILOT_JWT_PUBLIC_KEY_PATH")
                        .unwrap_or_else(|_| "/secrets/jwt-public.pem".to_string()),
                ),
                issuer_url: env::var("NETPILOT_ISSUER_URL")
                    .unwrap_or_else(|_| "http://netpilot:8000".to_string()),
            },

            // Build info
            commit_hash: env::var("COMMIT_HASH").unwrap_or_else(|_| "unknown".to_string()),
            build_time: env::var("BUILD_TIME").unwrap_or_else(|_| "unknown".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),

            // Logging
            log_level: env::var("NETPILOT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_env();
        assert!(!config.host.is_empty());
        assert!(config.port > 0);
        assert_eq!(config.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_db_url_format() {
        let config = Config::from_env();
        let url = config.db_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("?mode=rwc"));
    }
}
