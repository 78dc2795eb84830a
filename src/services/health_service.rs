use crate::adapters::backend::BackendClient;
use crate::adapters::keycloak::KeycloakClient;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("keycloak-session-gateway");
        Self {
            status: meter
                .i64_gauge("gateway_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    keycloak: Arc<KeycloakClient>,
    backend: BackendClient,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(keycloak: Arc<KeycloakClient>, backend: BackendClient, config: HealthConfig) -> Self {
        Self { keycloak, backend, config, metrics: Metrics::new() }
    }

    /// Checks that the realm's discovery document is served.
    ///
    /// # Errors
    /// Returns a string describing the failure if the identity provider is unreachable.
    pub async fn check_provider(&self) -> Result<(), String> {
        let provider_timeout = Duration::from_millis(self.config.provider_timeout_ms);

        let result = match timeout(provider_timeout, self.keycloak.check_discovery()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Identity provider check failed for {}: {e}", self.keycloak.issuer())),
            Err(_) => Err("Identity provider check timed out".to_string()),
        };
        self.record("identity_provider", result.is_ok());
        result
    }

    /// Checks that the backend answers HTTP at all.
    ///
    /// # Errors
    /// Returns a string describing the failure if the backend is unreachable.
    pub async fn check_backend(&self) -> Result<(), String> {
        let backend_timeout = Duration::from_millis(self.config.backend_timeout_ms);

        let result = match timeout(backend_timeout, self.backend.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Backend check failed for {}: {e}", self.backend.base_url())),
            Err(_) => Err("Backend check timed out".to_string()),
        };
        self.record("backend", result.is_ok());
        result
    }

    fn record(&self, component: &'static str, ok: bool) {
        self.metrics.status.record(i64::from(ok), &[KeyValue::new("component", component)]);
    }
}
