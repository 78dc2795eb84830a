use crate::config::SessionConfig;
use crate::domain::session::SessionTokenRecord;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifetime of the sign-in state cookie.
pub const LOGIN_STATE_TTL_SECS: u64 = 600;

#[derive(Error, Debug)]
pub enum SessionCodecError {
    #[error("Failed to sign session: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("Invalid session: {0}")]
    Decode(jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SignedClaims<T> {
    #[serde(flatten)]
    payload: T,
    iat: u64,
    exp: u64,
}

/// In-flight authorization-code sign-in, kept in a short-lived signed cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    pub state: String,
    pub code_verifier: String,
    pub callback_url: String,
}

/// Signs and verifies the cookie payloads (HS256 JWT).
#[derive(Clone)]
pub struct SessionCodec {
    secret: String,
    max_age_secs: u64,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").field("max_age_secs", &self.max_age_secs).finish_non_exhaustive()
    }
}

impl SessionCodec {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self { secret: config.secret.clone(), max_age_secs: config.max_age_secs }
    }

    /// # Errors
    /// Returns [`SessionCodecError::Encode`] if signing fails.
    pub fn encode_session(&self, record: &SessionTokenRecord, now: i64) -> Result<String, SessionCodecError> {
        self.sign(record, now, self.max_age_secs)
    }

    /// # Errors
    /// Returns [`SessionCodecError::Decode`] for a forged, expired or malformed cookie.
    pub fn decode_session(&self, token: &str) -> Result<SessionTokenRecord, SessionCodecError> {
        self.verify(token)
    }

    /// # Errors
    /// Returns [`SessionCodecError::Encode`] if signing fails.
    pub fn encode_login_state(&self, state: &LoginState, now: i64) -> Result<String, SessionCodecError> {
        self.sign(state, now, LOGIN_STATE_TTL_SECS)
    }

    /// # Errors
    /// Returns [`SessionCodecError::Decode`] for a forged, expired or malformed cookie.
    pub fn decode_login_state(&self, token: &str) -> Result<LoginState, SessionCodecError> {
        self.verify(token)
    }

    fn sign<T: Serialize>(&self, payload: &T, now: i64, ttl_secs: u64) -> Result<String, SessionCodecError> {
        let iat = u64::try_from(now).unwrap_or_default();
        let claims = SignedClaims { payload, iat, exp: iat.saturating_add(ttl_secs) };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(SessionCodecError::Encode)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, SessionCodecError> {
        decode::<SignedClaims<T>>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &Validation::default())
            .map(|data| data.claims.payload)
            .map_err(SessionCodecError::Decode)
    }
}
