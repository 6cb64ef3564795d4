//! Configuration for matchgate-daemon

use chrono::Duration;
use matchgate_rating::{DEFAULT_INITIAL_RATING, DEFAULT_K_FACTOR};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential signing configuration
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Rating engine configuration
    #[serde(default)]
    pub rating: RatingConfig,

    /// Counter seeds
    #[serde(default)]
    pub counters: CounterConfig,

    /// Admission limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS for browser clients
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9091)),
            enable_cors: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    Memory,

    /// SQLite storage
    Sqlite {
        /// Connection URL, e.g. `sqlite://matchgate.db`
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Seconds a writer waits for the database lock
        #[serde(default = "default_busy_timeout")]
        busy_timeout_secs: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            url: "sqlite://matchgate.db".to_string(),
            max_connections: default_pool_size(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// Credential signing configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Shared signing key. Trusted game servers must hold the same value.
    #[serde(default)]
    pub secret: String,

    /// Login credential lifetime in seconds, 0 = unlimited
    #[serde(default)]
    pub login_ttl_secs: u64,

    /// Match credential lifetime in seconds
    #[serde(default = "default_match_ttl")]
    pub match_ttl_secs: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            login_ttl_secs: 0,
            match_ttl_secs: default_match_ttl(),
        }
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("secret", &"<redacted>")
            .field("login_ttl_secs", &self.login_ttl_secs)
            .field("match_ttl_secs", &self.match_ttl_secs)
            .finish()
    }
}

impl CredentialConfig {
    pub fn login_ttl(&self) -> Option<Duration> {
        (self.login_ttl_secs > 0).then(|| seconds(self.login_ttl_secs))
    }

    pub fn match_ttl(&self) -> Duration {
        seconds(self.match_ttl_secs)
    }
}

/// Rating engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingConfig {
    #[serde(default = "default_k_factor")]
    pub k_factor: f64,

    #[serde(default = "default_initial_rating")]
    pub initial_rating: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_INITIAL_RATING,
        }
    }
}

/// Counter seeds, applied only when a store is first created
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterConfig {
    #[serde(default)]
    pub session_offset: u64,
}

/// Admission limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of players, 0 = unlimited
    #[serde(default)]
    pub max_players: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

fn default_match_ttl() -> u64 {
    1800
}

fn default_k_factor() -> f64 {
    DEFAULT_K_FACTOR
}

fn default_initial_rating() -> f64 {
    DEFAULT_INITIAL_RATING
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Upper bound on configured lifetimes, roughly a century.
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, and `MATCHGATE__*`
    /// environment variables, in that order.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MATCHGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// In-memory configuration with the given secret, for tests and local runs
    pub fn development(secret: &str) -> Self {
        Self {
            storage: StorageConfig::Memory,
            credentials: CredentialConfig {
                secret: secret.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.credentials.secret.is_empty() {
            return Err("credentials.secret must be set".to_string());
        }
        if self.credentials.match_ttl_secs == 0 {
            return Err("credentials.match_ttl_secs must be positive".to_string());
        }
        if !self.rating.k_factor.is_finite() || self.rating.k_factor <= 0.0 {
            return Err("rating.k_factor must be a positive number".to_string());
        }
        if !self.rating.initial_rating.is_finite() {
            return Err("rating.initial_rating must be finite".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 9091);
        assert!(matches!(config.storage, StorageConfig::Sqlite { .. }));
        assert_eq!(config.rating.k_factor, 32.0);
        assert_eq!(config.rating.initial_rating, 1500.0);
        assert_eq!(config.credentials.match_ttl_secs, 1800);
    }

    #[test]
    fn test_default_requires_secret() {
        assert!(DaemonConfig::default().validate().is_err());
        assert!(DaemonConfig::development("secret").validate().is_ok());
    }

    #[test]
    fn test_ttl_conversion() {
        let mut config = CredentialConfig::default();
        assert!(config.login_ttl().is_none());
        config.login_ttl_secs = 60;
        assert_eq!(config.login_ttl(), Some(Duration::seconds(60)));
        assert_eq!(config.match_ttl(), Duration::seconds(1800));
    }

    #[test]
    fn test_rejects_bad_k_factor() {
        let mut config = DaemonConfig::development("secret");
        config.rating.k_factor = f64::NAN;
        assert!(config.validate().is_err());
        config.rating.k_factor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let config = DaemonConfig::development("hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: DaemonConfig = serde_json::from_str(
            r#"{"storage": {"type": "memory"}, "credentials": {"secret": "s", "match_ttl_secs": 60}}"#,
        )
        .unwrap();
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert_eq!(config.credentials.match_ttl_secs, 60);
        assert_eq!(config.credentials.login_ttl_secs, 0);
    }
}
