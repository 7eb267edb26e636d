//! Configuration management.

mod settings;

pub use settings::{
    AuditConfig, LimitsConfig, LoggingConfig, SecurityConfig, ServerConfig, Settings, StreamConfig,
    UsersConfig,
};
