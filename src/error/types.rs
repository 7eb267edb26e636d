//! Error types for the Vigil daemon.

use thiserror::Error;

/// Main error type for the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Authentication errors.
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthErrorKind },

    /// Metric sampling errors.
    #[error("Metric error: {kind}")]
    Metric { kind: MetricErrorKind },

    /// Telemetry stream errors.
    #[error("Stream error: {kind}")]
    Stream { kind: StreamErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Authentication error kinds.
///
/// Callers outside the auth layer must collapse all of these into a single
/// undifferentiated "unauthorized" outcome; the distinction exists for
/// server-side logging only.
#[derive(Error, Debug)]
pub enum AuthErrorKind {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Failed to read session secret: {message}")]
    SecretError { message: String },
}

/// Metric sampling error kinds.
///
/// These are non-fatal: the streamer substitutes neutral defaults and
/// continues the cycle.
#[derive(Error, Debug)]
pub enum MetricErrorKind {
    #[error("Metric source unavailable: {src}")]
    Unavailable { src: String },

    #[error("Failed to parse metric output: {message}")]
    Parse { message: String },
}

/// Telemetry stream error kinds.
#[derive(Error, Debug)]
pub enum StreamErrorKind {
    /// The peer dropped the connection. Terminal for the stream loop but
    /// not reported to the client; it only triggers cleanup.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

impl DaemonError {
    /// True when this error must surface to HTTP callers as an
    /// undifferentiated 401 rather than a 4xx/5xx with detail.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DaemonError::Auth { .. })
    }
}
