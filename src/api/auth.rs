use crate::api::AppState;
use crate::api::cookies::{self, LOGIN_COOKIE};
use crate::api::middleware::MaybeSession;
use crate::api::schemas::auth::{CallbackQuery, SignInQuery, UrlResponse};
use crate::domain::session::{project_public_session, unix_now};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

pub async fn sign_in(State(state): State<AppState>, Query(query): Query<SignInQuery>) -> Result<Response> {
    let redirect = state.sign_in_service.begin(query.callback_url.as_deref(), unix_now())?;

    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, cookies::login_cookie(&redirect.login_cookie, state.cookie_policy)?);
    Ok((headers, Redirect::to(redirect.location.as_str())).into_response())
}

pub async fn callback(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    if let Some(error) = query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "Identity provider returned an error"
        );
        return Ok(Redirect::to("/?error=OAuthCallback").into_response());
    }

    let code = query.code.ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;
    let login_cookie = cookies::parse_cookie(&request_headers, LOGIN_COOKIE);

    let now = unix_now();
    let completed =
        state.sign_in_service.complete(&code, query.state.as_deref(), login_cookie.as_deref(), now).await?;

    let token = state.session_codec.encode_session(&completed.record, now).map_err(|e| {
        tracing::error!(error = %e, "Failed to sign session");
        AppError::Internal
    })?;

    let mut headers = HeaderMap::new();
    cookies::write_session(&mut headers, &request_headers, Some(&token), state.cookie_policy)?;
    headers.append(header::SET_COOKIE, cookies::clear_cookie(LOGIN_COOKIE, state.cookie_policy)?);
    Ok((headers, Redirect::to(&completed.callback_url)).into_response())
}

/// Public view of the current session, or `{}` when signed out.
pub async fn session(MaybeSession(record): MaybeSession) -> Response {
    match record {
        Some(record) => Json(project_public_session(&record)).into_response(),
        None => Json(json!({})).into_response(),
    }
}

pub async fn sign_out(State(state): State<AppState>, request_headers: HeaderMap) -> Result<Response> {
    let mut headers = HeaderMap::new();
    cookies::write_session(&mut headers, &request_headers, None, state.cookie_policy)?;
    Ok((headers, Json(UrlResponse { url: "/".to_string() })).into_response())
}

/// Ends the local session and returns the provider logout URL for the browser to visit.
///
/// A session whose refresh failed can still log out: the id token is kept.
pub async fn federated_logout(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    MaybeSession(record): MaybeSession,
) -> Result<Response> {
    let record = record.ok_or(AppError::AuthError)?;
    let url = state.sign_in_service.federated_logout_url(&record)?;

    let mut headers = HeaderMap::new();
    cookies::write_session(&mut headers, &request_headers, None, state.cookie_policy)?;
    Ok((headers, Json(UrlResponse { url: url.to_string() })).into_response())
}
