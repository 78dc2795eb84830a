use crate::config::KeycloakConfig;
use crate::domain::pkce::Pkce;
use crate::domain::token_set::TokenSet;
use crate::domain::user::OidcUserInfo;
use crate::services::token_endpoint::{ProviderError, TokenEndpoint};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Client for a Keycloak realm's OpenID Connect endpoints.
#[derive(Clone)]
pub struct KeycloakClient {
    http: reqwest::Client,
    issuer: String,
    client_id: String,
    client_secret: String,
    scopes: String,
}

impl std::fmt::Debug for KeycloakClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakClient")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl KeycloakClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &KeycloakConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            http,
            issuer: config.issuer.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
        })
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/protocol/openid-connect/{name}", self.issuer)
    }

    /// Authorization endpoint URL for the code flow with a PKCE `S256` challenge.
    ///
    /// # Errors
    /// Returns [`ProviderError::InvalidUrl`] if the issuer is not a valid URL.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url, ProviderError> {
        Url::parse_with_params(
            &self.endpoint("auth"),
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", self.scopes.as_str()),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", Pkce::METHOD),
            ],
        )
        .map_err(|e| ProviderError::InvalidUrl(e.to_string()))
    }

    /// RP-initiated logout URL ending the provider-side session.
    ///
    /// # Errors
    /// Returns [`ProviderError::InvalidUrl`] if the issuer is not a valid URL.
    pub fn end_session_url(&self, id_token: &str, post_logout_redirect_uri: &str) -> Result<Url, ProviderError> {
        Url::parse_with_params(
            &self.endpoint("logout"),
            &[("id_token_hint", id_token), ("post_logout_redirect_uri", post_logout_redirect_uri)],
        )
        .map_err(|e| ProviderError::InvalidUrl(e.to_string()))
    }

    #[tracing::instrument(err(level = "warn"), skip(self, code, code_verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, ProviderError> {
        self.post_token_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    #[tracing::instrument(err(level = "warn"), skip(self, access_token))]
    pub async fn userinfo(&self, access_token: &str) -> Result<OidcUserInfo, ProviderError> {
        let response = self.http.get(self.endpoint("userinfo")).bearer_auth(access_token).send().await?;
        parse_json(response).await
    }

    /// Fetches the realm's discovery document; used as the readiness probe.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] if the document cannot be fetched.
    pub async fn check_discovery(&self) -> Result<(), ProviderError> {
        let url = format!("{}/.well-known/openid-configuration", self.issuer);
        let response = self.http.get(url).send().await?;
        parse_json::<serde_json::Value>(response).await.map(|_| ())
    }

    async fn post_token_form(&self, grant: &[(&str, &str)]) -> Result<TokenSet, ProviderError> {
        let mut form: Vec<(&str, &str)> =
            vec![("client_id", self.client_id.as_str()), ("client_secret", self.client_secret.as_str())];
        form.extend_from_slice(grant);

        let response = self.http.post(self.endpoint("token")).form(&form).send().await?;
        parse_json(response).await
    }
}

#[async_trait]
impl TokenEndpoint for KeycloakClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.post_token_form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)]).await
    }
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
