use crate::api::AppState;
use crate::api::cookies::{self, SESSION_COOKIE};
use crate::domain::session::{SessionTokenRecord, unix_now};
use crate::error::AppError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::convert::Infallible;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Routes that end or start a session; they read the cookie as stored and never refresh it.
const NO_REFRESH_PATHS: [&str; 4] =
    ["/api/auth/signin", "/api/auth/callback/keycloak", "/api/auth/signout", "/api/auth/federated-logout"];

/// Session attached to the request by [`load_session`], after the token check.
#[derive(Clone, Debug)]
pub struct CurrentSession(pub SessionTokenRecord);

/// Decodes the session cookie, keeps its access token valid and writes it back when it changed.
pub async fn load_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let stored = cookies::read_chunked(request.headers(), SESSION_COOKIE).and_then(|token| {
        state
            .session_codec
            .decode_session(&token)
            .inspect_err(|e| tracing::debug!(error = %e, "Ignoring session cookie"))
            .ok()
    });

    let Some(stored) = stored else {
        return next.run(request).await;
    };

    if NO_REFRESH_PATHS.contains(&request.uri().path()) {
        request.extensions_mut().insert(CurrentSession(stored));
        return next.run(request).await;
    }

    let checked = state.token_manager.ensure_valid_token(stored.clone()).await;
    let changed = checked != stored;
    tracing::Span::current().record("user_id", tracing::field::display(&checked.user.id));

    let request_headers = request.headers().clone();
    request.extensions_mut().insert(CurrentSession(checked.clone()));
    let mut response = next.run(request).await;

    if changed && !cookies::sets_session(response.headers()) {
        let written = state
            .session_codec
            .encode_session(&checked, unix_now())
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to sign refreshed session");
                AppError::Internal
            })
            .and_then(|token| {
                cookies::write_session(response.headers_mut(), &request_headers, Some(&token), state.cookie_policy)
            });
        if let Err(e) = written {
            return e.into_response();
        }
    }

    response
}

/// Redirects requests for protected pages to the landing page when there is no session.
pub async fn protect_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.config.server.is_protected(request.uri().path())
        && request.extensions().get::<CurrentSession>().is_none()
    {
        tracing::debug!(path = %request.uri().path(), "Redirecting unauthenticated request");
        return Redirect::to("/").into_response();
    }
    next.run(request).await
}

/// A session whose access token is usable for downstream calls.
#[derive(Debug)]
pub struct AuthSession(pub SessionTokenRecord);

impl AuthSession {
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.0.access_token
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let CurrentSession(record) = parts.extensions.get::<CurrentSession>().cloned().ok_or(AppError::AuthError)?;

        if record.refresh_failed() {
            return Err(AppError::SessionExpired);
        }
        Ok(Self(record))
    }
}

/// The session if there is one, valid or not.
#[derive(Debug)]
pub struct MaybeSession(pub Option<SessionTokenRecord>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<CurrentSession>().map(|session| session.0.clone())))
    }
}

/// Keeps a caller-supplied `x-request-id`, otherwise generates a UUID.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, request: &axum::http::Request<B>) -> Option<RequestId> {
        let existing = request
            .headers()
            .get("x-request-id")
            .filter(|value| value.to_str().is_ok_and(|s| !s.is_empty() && s.len() <= 128))
            .cloned();

        let value = existing.or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok())?;
        Some(RequestId::new(value))
    }
}
