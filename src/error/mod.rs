//! Error handling for the daemon.

mod types;

pub use types::{AuthErrorKind, DaemonError, DaemonResult, MetricErrorKind, StreamErrorKind};
