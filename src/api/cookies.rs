//! Session cookie reading and writing.
//!
//! A signed session can outgrow the per-cookie browser limit once it carries three
//! Keycloak tokens, so values longer than [`CHUNK_SIZE`] are split over
//! `name.0`, `name.1`, ... and reassembled on read.

use crate::error::{AppError, Result};
use axum::http::{HeaderMap, HeaderValue, header};

pub const SESSION_COOKIE: &str = "gateway.session-token";
pub const LOGIN_COOKIE: &str = "gateway.login-state";

pub(crate) const CHUNK_SIZE: usize = 3800;

#[derive(Clone, Copy, Debug)]
pub struct CookiePolicy {
    pub secure: bool,
    pub max_age_secs: u64,
}

fn request_cookies(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
}

#[must_use]
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    request_cookies(headers).find(|(key, _)| *key == name).map(|(_, value)| value.to_string())
}

fn chunk_index(key: &str, name: &str) -> Option<usize> {
    key.strip_prefix(name)?.strip_prefix('.')?.parse().ok()
}

/// Reads a possibly chunked cookie value.
#[must_use]
pub fn read_chunked(headers: &HeaderMap, name: &str) -> Option<String> {
    if let Some(value) = parse_cookie(headers, name) {
        return Some(value);
    }

    let mut chunks: Vec<(usize, &str)> =
        request_cookies(headers).filter_map(|(key, value)| chunk_index(key, name).map(|i| (i, value))).collect();
    if chunks.is_empty() {
        return None;
    }
    chunks.sort_unstable_by_key(|(index, _)| *index);
    if chunks.iter().enumerate().any(|(expected, (index, _))| expected != *index) {
        return None;
    }
    Some(chunks.into_iter().map(|(_, value)| value).collect())
}

fn set_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> Result<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{secure}"))
        .map_err(|_| AppError::Internal)
}

/// `Set-Cookie` value that removes `name` from the browser.
///
/// # Errors
/// Returns [`AppError::Internal`] if the name is not a valid header value.
pub fn clear_cookie(name: &str, policy: CookiePolicy) -> Result<HeaderValue> {
    set_cookie(name, "", 0, policy.secure)
}

/// # Errors
/// Returns [`AppError::Internal`] if the value is not a valid header value.
pub fn login_cookie(value: &str, policy: CookiePolicy) -> Result<HeaderValue> {
    set_cookie(LOGIN_COOKIE, value, crate::services::session_codec::LOGIN_STATE_TTL_SECS, policy.secure)
}

/// Appends the `Set-Cookie` headers replacing the session cookie with `value`,
/// or removing it when `value` is `None`. Chunks present on the request that the
/// new value does not use are expired.
///
/// # Errors
/// Returns [`AppError::Internal`] if a header value cannot be built.
pub fn write_session(
    response_headers: &mut HeaderMap,
    request_headers: &HeaderMap,
    value: Option<&str>,
    policy: CookiePolicy,
) -> Result<()> {
    let existing_plain = parse_cookie(request_headers, SESSION_COOKIE).is_some();
    let existing_chunks: Vec<usize> =
        request_cookies(request_headers).filter_map(|(key, _)| chunk_index(key, SESSION_COOKIE)).collect();

    let chunks: Vec<&str> = match value {
        Some(value) if value.len() > CHUNK_SIZE => value
            .as_bytes()
            .chunks(CHUNK_SIZE)
            .map(|chunk| std::str::from_utf8(chunk).map_err(|_| AppError::Internal))
            .collect::<Result<_>>()?,
        _ => Vec::new(),
    };

    match value {
        Some(value) if chunks.is_empty() => {
            response_headers.append(header::SET_COOKIE, set_cookie(SESSION_COOKIE, value, policy.max_age_secs, policy.secure)?);
        }
        _ if existing_plain => {
            response_headers.append(header::SET_COOKIE, clear_cookie(SESSION_COOKIE, policy)?);
        }
        _ => {}
    }

    for (index, chunk) in chunks.iter().enumerate() {
        let name = format!("{SESSION_COOKIE}.{index}");
        response_headers.append(header::SET_COOKIE, set_cookie(&name, chunk, policy.max_age_secs, policy.secure)?);
    }

    for index in existing_chunks.into_iter().filter(|index| *index >= chunks.len()) {
        response_headers.append(header::SET_COOKIE, clear_cookie(&format!("{SESSION_COOKIE}.{index}"), policy)?);
    }

    Ok(())
}

/// Whether a response already carries a `Set-Cookie` for the session.
#[must_use]
pub fn sets_session(headers: &HeaderMap) -> bool {
    headers.get_all(header::SET_COOKIE).iter().filter_map(|value| value.to_str().ok()).any(|value| {
        value.split_once('=').is_some_and(|(key, _)| key == SESSION_COOKIE || chunk_index(key, SESSION_COOKIE).is_some())
    })
}
