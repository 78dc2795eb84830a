use clap::ValueEnum;
use serde::Deserialize;
use thiserror::Error;

/// Interpretation of a bare `expires_at` field in a token response.
///
/// `expires_in` is always a lifetime in seconds. Some providers instead send
/// `expires_at`, which may be either a lifetime or an absolute unix timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ExpiryMode {
    /// `expires_at` is a lifetime in seconds, added to the current time.
    #[default]
    Relative,
    /// `expires_at` is an absolute unix timestamp.
    Absolute,
}

/// Token set returned by the identity provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSetError {
    #[error("token response has an empty access token")]
    EmptyAccessToken,
    #[error("token response carries no expiry")]
    MissingExpiry,
    #[error("token response expires at {expires_at}, not after {now}")]
    AlreadyExpired { expires_at: i64, now: i64 },
    #[error("token response has no id token")]
    MissingIdToken,
    #[error("token response has no refresh token")]
    MissingRefreshToken,
}

impl TokenSet {
    /// Unix timestamp at which the access token in this set expires.
    #[must_use]
    pub fn access_token_expires_at(&self, now: i64, mode: ExpiryMode) -> Option<i64> {
        if let Some(lifetime) = self.expires_in {
            return Some(now.saturating_add(lifetime));
        }

        self.expires_at.map(|value| match mode {
            ExpiryMode::Relative => now.saturating_add(value),
            ExpiryMode::Absolute => value,
        })
    }

    pub(crate) fn checked_expiry(&self, now: i64, mode: ExpiryMode) -> Result<i64, TokenSetError> {
        if self.access_token.is_empty() {
            return Err(TokenSetError::EmptyAccessToken);
        }
        let expires_at = self.access_token_expires_at(now, mode).ok_or(TokenSetError::MissingExpiry)?;
        if expires_at <= now {
            return Err(TokenSetError::AlreadyExpired { expires_at, now });
        }
        Ok(expires_at)
    }
}
