use crate::domain::token_set::TokenSet;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Identity provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed identity provider response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid identity provider URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync + std::fmt::Debug {
    /// Exchanges a refresh token for a new token set (`grant_type=refresh_token`).
    ///
    /// # Errors
    /// Returns a [`ProviderError`] on transport failure, a non-2xx status or an unparsable body.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError>;
}
