//! Shared application state for the HTTP layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::auth::{CredentialStore, StaticCredentialStore, TokenCodec};
use crate::config::Settings;
use crate::error::DaemonResult;
use crate::metrics::{MetricsProvider, RateSampler, SystemMetricsProvider};
use crate::stream::TelemetryStreamer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    settings: Settings,
    codec: TokenCodec,
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn MetricsProvider>,
    streamer: TelemetryStreamer,
    audit: Option<Arc<AuditLogger>>,
}

impl AppState {
    /// Build application state from loaded settings: read the token
    /// secret, load the credential store, and wire the production metrics
    /// provider.
    pub fn from_settings(settings: Settings, shutdown: Arc<Notify>) -> DaemonResult<Self> {
        let secret = TokenCodec::load_secret(&settings.security.secret_path)?;
        let store = Arc::new(StaticCredentialStore::from_config(
            &settings.users,
            settings.security.password_iterations,
        )?);
        let provider = Arc::new(SystemMetricsProvider::new(Duration::from_secs(
            settings.limits.gpu_query_timeout_seconds,
        )));

        Ok(Self::with_parts(settings, store, provider, &secret, shutdown))
    }

    /// Build application state from explicit parts. Used by
    /// `from_settings` and by tests that substitute the store or provider.
    ///
    /// Must be called within a tokio runtime: the rate-baseline cleanup
    /// task is started here.
    pub fn with_parts(
        settings: Settings,
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn MetricsProvider>,
        secret: &[u8],
        shutdown: Arc<Notify>,
    ) -> Self {
        let codec = TokenCodec::new(secret, settings.security.token_ttl_seconds);

        let audit = if settings.audit.enabled {
            match AuditLogger::new(&settings.audit.log_path) {
                Ok(logger) => {
                    info!(
                        path = %settings.audit.log_path.display(),
                        "Audit logging enabled"
                    );
                    Some(Arc::new(logger))
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %settings.audit.log_path.display(),
                        "Failed to create audit logger, audit logging disabled"
                    );
                    None
                }
            }
        } else {
            info!("Audit logging disabled");
            None
        };

        let sampler = Arc::new(RateSampler::new());
        let baseline_ttl = Duration::from_secs(settings.stream.baseline_ttl_seconds);
        sampler.start_cleanup_task(Duration::from_secs(60), baseline_ttl);

        let streamer = TelemetryStreamer::new(
            Arc::clone(&provider),
            sampler,
            &settings.stream,
            shutdown,
            audit.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                settings,
                codec,
                store,
                provider,
                streamer,
                audit,
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.inner.codec
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn provider(&self) -> Arc<dyn MetricsProvider> {
        Arc::clone(&self.inner.provider)
    }

    pub fn streamer(&self) -> &TelemetryStreamer {
        &self.inner.streamer
    }

    pub fn audit(&self) -> Option<Arc<AuditLogger>> {
        self.inner.audit.clone()
    }
}
