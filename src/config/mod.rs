//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HS256 secret shared with the identity service
    pub jwt_secret: String,

    /// Persistence collaborator REST base URL (None = in-memory store)
    pub persistence_url: Option<String>,
    /// Service key for the persistence collaborator
    pub persistence_service_key: String,

    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,

    /// Interval between gateway heartbeat pings
    pub heartbeat_interval: Duration,
    /// Pause matches after every point until a participant sends `go`
    pub pause_between_rounds: bool,
    /// Fixed seed for tournament shuffles
    pub shuffle_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR for hosted deployments
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let heartbeat_secs = match env::var("HEARTBEAT_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::Invalid("HEARTBEAT_INTERVAL_SECS"))?,
            Err(_) => 10,
        };

        let pause_between_rounds = match env::var("PAUSE_BETWEEN_ROUNDS") {
            Ok(raw) => raw
                .parse::<bool>()
                .map_err(|_| ConfigError::Invalid("PAUSE_BETWEEN_ROUNDS"))?,
            Err(_) => false,
        };

        let shuffle_seed = match env::var("SHUFFLE_SEED") {
            Ok(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| ConfigError::Invalid("SHUFFLE_SEED"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            jwt_secret: env::var("AUTH_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?,

            persistence_url: env::var("PERSISTENCE_URL").ok().filter(|url| !url.is_empty()),
            persistence_service_key: env::var("PERSISTENCE_SERVICE_KEY").unwrap_or_default(),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            pause_between_rounds,
            shuffle_seed,
        })
    }

    /// Configuration for tests and local tooling
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            jwt_secret: jwt_secret.to_string(),
            persistence_url: None,
            persistence_service_key: String::new(),
            client_origin: "*".to_string(),
            heartbeat_interval: Duration::from_secs(10),
            pause_between_rounds: false,
            shuffle_seed: Some(42),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
