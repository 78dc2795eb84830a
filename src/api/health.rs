use crate::api::MgmtState;
use crate::api::schemas::health::{HealthResponse, ReadinessResponse};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Public health endpoint: the gateway process is up.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
    })
}

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks the identity provider and the backend.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (provider_res, backend_res) =
        tokio::join!(state.health_service.check_provider(), state.health_service.check_backend());

    let mut status_code = StatusCode::OK;
    let provider_status = if let Err(e) = provider_res {
        tracing::warn!(error = %e, component = "identity_provider", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let backend_status = if let Err(e) = backend_res {
        tracing::warn!(error = %e, component = "backend", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let response = ReadinessResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        identity_provider: provider_status.to_string(),
        backend: backend_status.to_string(),
    };

    (status_code, Json(response))
}
