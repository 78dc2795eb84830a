use crate::adapters::keycloak::KeycloakClient;
use crate::domain::pkce::{Pkce, random_token};
use crate::domain::session::{SessionTokenRecord, SessionUser};
use crate::domain::token_set::ExpiryMode;
use crate::error::{AppError, Result};
use crate::services::session_codec::{LoginState, SessionCodec};
use crate::services::token_endpoint::ProviderError;
use opentelemetry::{global, metrics::Counter};
use reqwest::Url;
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    sign_in_total: Counter<u64>,
    sign_out_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("keycloak-session-gateway");
        Self {
            sign_in_total: meter
                .u64_counter("session_sign_in_total")
                .with_description("Total number of completed sign-ins")
                .build(),
            sign_out_total: meter
                .u64_counter("session_sign_out_total")
                .with_description("Total number of federated sign-outs")
                .build(),
        }
    }
}

#[derive(Debug)]
pub struct SignInRedirect {
    pub location: Url,
    pub login_cookie: String,
}

#[derive(Debug)]
pub struct CompletedSignIn {
    pub record: SessionTokenRecord,
    pub callback_url: String,
}

/// Authorization-code sign-in against Keycloak, plus provider logout.
#[derive(Clone, Debug)]
pub struct SignInService {
    keycloak: Arc<KeycloakClient>,
    codec: SessionCodec,
    expiry_mode: ExpiryMode,
    redirect_uri: String,
    public_url: String,
    metrics: Metrics,
}

impl SignInService {
    #[must_use]
    pub fn new(
        keycloak: Arc<KeycloakClient>,
        codec: SessionCodec,
        expiry_mode: ExpiryMode,
        redirect_uri: String,
        public_url: String,
    ) -> Self {
        Self { keycloak, codec, expiry_mode, redirect_uri, public_url, metrics: Metrics::new() }
    }

    /// Starts a sign-in: provider redirect plus the signed state to remember it by.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if the redirect URL or login cookie cannot be built.
    pub fn begin(&self, callback_url: Option<&str>, now: i64) -> Result<SignInRedirect> {
        let pkce = Pkce::generate();
        let state = LoginState {
            state: random_token(),
            code_verifier: pkce.verifier,
            callback_url: sanitize_callback_url(callback_url),
        };

        let location = self
            .keycloak
            .authorization_url(&self.redirect_uri, &state.state, &pkce.challenge)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build authorization URL");
                AppError::Internal
            })?;

        let login_cookie = self.codec.encode_login_state(&state, now).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign login state");
            AppError::Internal
        })?;

        Ok(SignInRedirect { location, login_cookie })
    }

    /// Finishes a sign-in from the provider callback and builds the initial session record.
    ///
    /// # Errors
    /// Returns [`AppError::AuthError`] if the state does not match or the code is rejected,
    /// and [`AppError::Upstream`] if the provider is unreachable.
    #[tracing::instrument(
        skip(self, code, state, login_cookie),
        fields(user_id = tracing::field::Empty),
        err(level = "warn")
    )]
    pub async fn complete(
        &self,
        code: &str,
        state: Option<&str>,
        login_cookie: Option<&str>,
        now: i64,
    ) -> Result<CompletedSignIn> {
        let login = login_cookie
            .and_then(|cookie| self.codec.decode_login_state(cookie).ok())
            .ok_or_else(|| {
                tracing::warn!("Sign-in callback without a valid login state");
                AppError::AuthError
            })?;

        if state != Some(login.state.as_str()) {
            tracing::warn!("Sign-in callback state mismatch");
            return Err(AppError::AuthError);
        }

        let tokens =
            self.keycloak.exchange_code(code, &login.code_verifier, &self.redirect_uri).await.map_err(provider_error)?;
        let user_info = self.keycloak.userinfo(&tokens.access_token).await.map_err(provider_error)?;
        let user = SessionUser::from(user_info);
        tracing::Span::current().record("user_id", tracing::field::display(&user.id));

        let record = SessionTokenRecord::from_initial_grant(tokens, user, now, self.expiry_mode).map_err(|e| {
            tracing::warn!(error = %e, "Incomplete initial grant");
            AppError::AuthError
        })?;

        self.metrics.sign_in_total.add(1, &[]);
        tracing::info!("Sign-in completed");

        Ok(CompletedSignIn { record, callback_url: login.callback_url })
    }

    /// Provider logout URL that returns the browser to the gateway's public URL.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] if the URL cannot be built.
    pub fn federated_logout_url(&self, record: &SessionTokenRecord) -> Result<Url> {
        let url = self.keycloak.end_session_url(&record.id_token, &self.public_url).map_err(|e| {
            tracing::error!(error = %e, "Failed to build end-session URL");
            AppError::Internal
        })?;
        self.metrics.sign_out_total.add(1, &[]);
        Ok(url)
    }
}

fn provider_error(err: ProviderError) -> AppError {
    match err {
        ProviderError::Status { status, body } if (400..500).contains(&status) => {
            tracing::warn!(status, body = %body, "Provider rejected sign-in");
            AppError::AuthError
        }
        other => AppError::Upstream(other.to_string()),
    }
}

/// Only local absolute paths are accepted as post-sign-in targets.
fn sanitize_callback_url(callback_url: Option<&str>) -> String {
    match callback_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => url.to_string(),
        _ => "/".to_string(),
    }
}
