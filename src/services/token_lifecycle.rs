use crate::domain::session::{SessionTokenRecord, unix_now};
use crate::domain::token_set::ExpiryMode;
use crate::services::token_endpoint::TokenEndpoint;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Access token still valid; nothing was sent to the provider.
    Fresh,
    RefreshSucceeded,
    /// Transport error, non-2xx or unusable token response.
    RefreshFailed,
}

impl RefreshOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::RefreshSucceeded => "refreshed",
            Self::RefreshFailed => "failed",
        }
    }
}

#[derive(Clone, Debug)]
struct Metrics {
    refresh_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("keycloak-session-gateway");
        Self {
            refresh_total: meter
                .u64_counter("session_refresh_total")
                .with_description("Access token checks by outcome (fresh, refreshed, failed)")
                .build(),
        }
    }
}

/// Keeps a session's access token valid.
///
/// Stateless apart from configuration: the caller passes the current record in and
/// persists whatever comes back. At most one token endpoint call per invocation and
/// no retries; a failed refresh is reported through the record's error flag.
#[derive(Clone, Debug)]
pub struct TokenLifecycleManager {
    endpoint: Arc<dyn TokenEndpoint>,
    expiry_mode: ExpiryMode,
    metrics: Metrics,
}

impl TokenLifecycleManager {
    #[must_use]
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, expiry_mode: ExpiryMode) -> Self {
        Self { endpoint, expiry_mode, metrics: Metrics::new() }
    }

    pub async fn ensure_valid_token(&self, record: SessionTokenRecord) -> SessionTokenRecord {
        self.ensure_valid_token_at(record, unix_now()).await
    }

    #[tracing::instrument(skip_all, fields(user.id = %record.user.id, outcome = tracing::field::Empty))]
    pub async fn ensure_valid_token_at(&self, record: SessionTokenRecord, now: i64) -> SessionTokenRecord {
        let (record, outcome) = self.evaluate(record, now).await;
        tracing::Span::current().record("outcome", outcome.as_str());
        self.metrics.refresh_total.add(1, &[KeyValue::new("outcome", outcome.as_str())]);
        record
    }

    /// Same as [`Self::ensure_valid_token_at`], also reporting what happened.
    pub async fn evaluate(&self, record: SessionTokenRecord, now: i64) -> (SessionTokenRecord, RefreshOutcome) {
        if record.is_fresh(now) {
            return (record, RefreshOutcome::Fresh);
        }

        let tokens = match self.endpoint.refresh(&record.refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Error refreshing access token");
                return (record.mark_refresh_failed(), RefreshOutcome::RefreshFailed);
            }
        };

        match record.with_refreshed_tokens(tokens, now, self.expiry_mode) {
            Ok(refreshed) => {
                tracing::debug!(expires_at = refreshed.access_token_expires_at, "Access token refreshed");
                (refreshed, RefreshOutcome::RefreshSucceeded)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected refresh response");
                (record.mark_refresh_failed(), RefreshOutcome::RefreshFailed)
            }
        }
    }
}
