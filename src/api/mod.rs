use crate::adapters::backend::BackendClient;
use crate::api::cookies::CookiePolicy;
use crate::config::Config;
use crate::error::AppError;
use crate::services::health_service::HealthService;
use crate::services::session_codec::SessionCodec;
use crate::services::sign_in_service::SignInService;
use crate::services::token_lifecycle::TokenLifecycleManager;
use axum::body::Body;
use axum::http::Request;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod backend;
pub mod cookies;
pub mod health;
pub mod middleware;
pub mod schemas;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub token_manager: TokenLifecycleManager,
    pub session_codec: SessionCodec,
    pub sign_in_service: SignInService,
    pub backend: BackendClient,
    pub cookie_policy: CookiePolicy,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

/// Configures and returns the primary application router.
pub fn app_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/signin", get(auth::sign_in))
        .route("/callback/keycloak", get(auth::callback))
        .route("/session", get(auth::session))
        .route("/signout", post(auth::sign_out))
        .route("/federated-logout", get(auth::federated_logout));

    let backend_routes = Router::new()
        .route("/items", get(backend::list_items).post(backend::create_item))
        .route("/items/me", get(backend::list_my_items))
        .route("/items/{id}", get(backend::get_item).put(backend::update_item).delete(backend::delete_item))
        .route("/users", get(backend::list_users))
        .route("/users/me", get(backend::current_user))
        .route("/users/me/profile", get(backend::get_profile).put(backend::update_profile));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/backend", backend_routes)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), middleware::protect_pages))
        .layer(from_fn_with_state(state.clone(), middleware::load_session))
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            middleware::MakeRequestUuidOrHeader,
        ))
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
