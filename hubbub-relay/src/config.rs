//! Configuration loading for hubbub-relay.
//!
//! Configuration is loaded from a TOML file (default: `hubbub.toml`).

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for hubbub-relay.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// File transfer configuration.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the relay listener (default: 0.0.0.0:5000).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Seconds to wait for live connections (including in-flight transfers)
    /// to finish during shutdown before aborting them (default: 30).
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum connection attempts per IP address per minute (default: 10).
    #[serde(default = "default_connections_per_ip")]
    pub connections_per_ip: u32,
    /// Maximum lines per identity per minute (default: 120).
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// Aggregate lines per second across all clients (default: 1000).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
    /// Timeout in seconds for receiving Join after connection (default: 10).
    /// Connections that don't claim an identity within this time are dropped.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    /// Maximum concurrent connections, counting unauthenticated ones
    /// (default: 1000).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Interval in seconds between limiter-state eviction sweeps
    /// (default: 3600).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// File transfer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Seconds to wait for the recipient's accept/reject before treating the
    /// offer as rejected (default: 30).
    #[serde(default = "default_accept_timeout_secs")]
    pub accept_timeout_secs: u64,
    /// Seconds to wait for each chunk from the sender before failing the
    /// transfer (default: 30).
    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
    /// Enable the HTTP health/metrics server (default: true).
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_connections_per_ip() -> u32 {
    10
}

fn default_messages_per_minute() -> u32 {
    120
}

fn default_global_requests_per_second() -> u32 {
    1000
}

fn default_auth_timeout_secs() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_accept_timeout_secs() -> u64 {
    30
}

fn default_chunk_timeout_secs() -> u64 {
    30
}

fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_http_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: default_connections_per_ip(),
            messages_per_minute: default_messages_per_minute(),
            global_requests_per_second: default_global_requests_per_second(),
            auth_timeout_secs: default_auth_timeout_secs(),
            max_connections: default_max_connections(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            accept_timeout_secs: default_accept_timeout_secs(),
            chunk_timeout_secs: default_chunk_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind(),
            enabled: default_http_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:5000");
        assert_eq!(config.limits.connections_per_ip, 10);
        assert_eq!(config.transfer.accept_timeout_secs, 30);
        assert!(config.http.enabled);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:6000"
shutdown_grace_secs = 5

[limits]
messages_per_minute = 60

[transfer]
accept_timeout_secs = 10

[http]
bind_address = "0.0.0.0:9090"
enabled = false
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:6000");
        assert_eq!(config.server.shutdown_grace_secs, 5);
        assert_eq!(config.limits.messages_per_minute, 60);
        assert_eq!(config.transfer.accept_timeout_secs, 10);
        assert_eq!(config.http.bind_address, "0.0.0.0:9090");
        assert!(!config.http.enabled);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.limits.auth_timeout_secs, 10);
        assert_eq!(config.limits.max_connections, 1000);
        assert_eq!(config.transfer.chunk_timeout_secs, 30);
    }

    #[test]
    fn config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:7000\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:7000");
        // Untouched sections fall back to defaults
        assert_eq!(config.limits.messages_per_minute, 120);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::from_file(std::path::Path::new("/does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
