use crate::domain::token_set::{ExpiryMode, TokenSet, TokenSetError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Error flag carried by a session whose access token could not be renewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionError {
    #[serde(rename = "RefreshAccessTokenError")]
    RefreshFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Token set of one signed-in user, persisted in the signed session cookie.
///
/// `access_token_expires_at` always describes the stored `access_token`; both
/// are only ever replaced together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenRecord {
    pub id_token: String,
    pub access_token: String,
    pub access_token_expires_at: i64,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    pub user: SessionUser,
}

impl SessionTokenRecord {
    /// Builds the record for a fresh sign-in from the authorization-code grant.
    ///
    /// # Errors
    /// Returns a [`TokenSetError`] if the grant lacks any of the tokens or the expiry.
    pub fn from_initial_grant(
        tokens: TokenSet,
        user: SessionUser,
        now: i64,
        mode: ExpiryMode,
    ) -> Result<Self, TokenSetError> {
        let access_token_expires_at = tokens.checked_expiry(now, mode)?;
        let id_token = tokens.id_token.ok_or(TokenSetError::MissingIdToken)?;
        let refresh_token = tokens.refresh_token.ok_or(TokenSetError::MissingRefreshToken)?;

        Ok(Self {
            id_token,
            access_token: tokens.access_token,
            access_token_expires_at,
            refresh_token,
            error: None,
            user,
        })
    }

    #[must_use]
    pub const fn is_fresh(&self, now: i64) -> bool {
        now < self.access_token_expires_at
    }

    #[must_use]
    pub const fn refresh_failed(&self) -> bool {
        matches!(self.error, Some(SessionError::RefreshFailed))
    }

    /// Returns a new record carrying the refreshed tokens.
    ///
    /// The id token and refresh token are only replaced when the provider issued new ones.
    ///
    /// # Errors
    /// Returns a [`TokenSetError`] if the response has no usable access token or expiry;
    /// `self` is left untouched in that case.
    pub fn with_refreshed_tokens(&self, tokens: TokenSet, now: i64, mode: ExpiryMode) -> Result<Self, TokenSetError> {
        let access_token_expires_at = tokens.checked_expiry(now, mode)?;

        Ok(Self {
            id_token: tokens.id_token.unwrap_or_else(|| self.id_token.clone()),
            access_token: tokens.access_token,
            access_token_expires_at,
            refresh_token: tokens.refresh_token.unwrap_or_else(|| self.refresh_token.clone()),
            error: None,
            user: self.user.clone(),
        })
    }

    #[must_use]
    pub fn mark_refresh_failed(mut self) -> Self {
        self.error = Some(SessionError::RefreshFailed);
        self
    }
}

/// Browser-facing view of a session. Never carries the refresh or id token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSession {
    pub user: SessionUser,
    pub access_token: String,
    pub access_token_expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
}

#[must_use]
pub fn project_public_session(record: &SessionTokenRecord) -> PublicSession {
    PublicSession {
        user: record.user.clone(),
        access_token: record.access_token.clone(),
        access_token_expires_at: record.access_token_expires_at,
        error: record.error,
    }
}

#[must_use]
pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
