//! Configuration settings for the Vigil daemon.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::DaemonError;

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub users: UsersConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:8080".
    pub listen: String,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Path to the session-token secret file.
    pub secret_path: PathBuf,
    /// Session token time-to-live in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// PBKDF2 iteration count for newly hashed passwords.
    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
}

/// Telemetry stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Seconds between metric frames on a live stream.
    #[serde(default = "default_stream_interval")]
    pub interval_seconds: u64,
    /// Outbound frame channel capacity per connection.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Seconds after which an unobserved rate baseline is evicted.
    #[serde(default = "default_baseline_ttl")]
    pub baseline_ttl_seconds: u64,
}

/// Credential store configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UsersConfig {
    /// Path to the TOML users file. When absent or unreadable, a default
    /// admin account is seeded in memory.
    pub file: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrently open telemetry streams.
    #[serde(default = "default_max_streams")]
    pub max_concurrent_streams: usize,
    /// Timeout for external metric queries (nvidia-smi) in seconds.
    #[serde(default = "default_gpu_query_timeout")]
    pub gpu_query_timeout_seconds: u64,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_token_ttl() -> u64 {
    43_200 // 12 hours
}

fn default_password_iterations() -> u32 {
    120_000
}

fn default_stream_interval() -> u64 {
    2
}

fn default_channel_capacity() -> usize {
    8
}

fn default_baseline_ttl() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_streams() -> usize {
    64
}

fn default_gpu_query_timeout() -> u64 {
    2
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/vigil/audit.log")
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_stream_interval(),
            channel_capacity: default_channel_capacity(),
            baseline_ttl_seconds: default_baseline_ttl(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: default_max_streams(),
            gpu_query_timeout_seconds: default_gpu_query_timeout(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DaemonError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DaemonError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| DaemonError::Config {
            message: format!("Failed to parse config file '{}': {}", path.display(), e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), DaemonError> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        // Validate log format
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        // Validate listen address
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid listen address '{}'. Expected host:port",
                    self.server.listen
                ),
            });
        }

        if self.security.token_ttl_seconds == 0 {
            return Err(DaemonError::Config {
                message: "token_ttl_seconds must be greater than zero".to_string(),
            });
        }

        if self.security.password_iterations < 100_000 {
            return Err(DaemonError::Config {
                message: format!(
                    "password_iterations must be at least 100000, got {}",
                    self.security.password_iterations
                ),
            });
        }

        if self.stream.interval_seconds == 0 {
            return Err(DaemonError::Config {
                message: "stream interval_seconds must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            server: ServerConfig {
                listen: "127.0.0.1:8080".to_string(),
            },
            security: SecurityConfig {
                secret_path: PathBuf::from("/etc/vigil/secret.key"),
                token_ttl_seconds: default_token_ttl(),
                password_iterations: default_password_iterations(),
            },
            stream: StreamConfig::default(),
            users: UsersConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            limits: LimitsConfig::default(),
            audit: AuditConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_token_ttl(), 43_200);
        assert_eq!(default_stream_interval(), 2);
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_log_format(), "pretty");
    }

    #[test]
    fn test_valid_settings_pass_validation() {
        assert!(test_settings().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut settings = test_settings();
        settings.logging.level = "loud".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_listen_address_rejected() {
        let mut settings = test_settings();
        settings.server.listen = "not-an-address".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut settings = test_settings();
        settings.security.token_ttl_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_weak_iteration_count_rejected() {
        let mut settings = test_settings();
        settings.security.password_iterations = 1_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:9090"

            [security]
            secret_path = "/etc/vigil/secret.key"

            [logging]
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.server.listen, "0.0.0.0:9090");
        assert_eq!(settings.security.token_ttl_seconds, 43_200);
        assert_eq!(settings.stream.interval_seconds, 2);
        assert!(settings.users.file.is_none());
        assert!(settings.validate().is_ok());
    }
}
