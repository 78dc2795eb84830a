use crate::config::BackendConfig;
use crate::domain::item::{Item, ItemCreate, ItemUpdate};
use crate::domain::user::{ProfileUpdate, UserInfo, UserProfile};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Backend returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("Malformed backend response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Client for the items/profile REST API. Every call carries the user's access token.
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { http, base_url: config.url.trim_end_matches('/').to_string() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url)).bearer_auth(access_token)
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token))]
    pub async fn list_items(&self, access_token: &str, all_items: bool) -> Result<Vec<Item>, BackendError> {
        let mut request = self.request(Method::GET, "/items", access_token);
        if all_items {
            request = request.query(&[("all_items", "true")]);
        }
        send_json(request).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token))]
    pub async fn list_my_items(&self, access_token: &str) -> Result<Vec<Item>, BackendError> {
        send_json(self.request(Method::GET, "/items/me", access_token)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token))]
    pub async fn get_item(&self, access_token: &str, id: i64) -> Result<Item, BackendError> {
        send_json(self.request(Method::GET, &format!("/items/{id}"), access_token)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token, item))]
    pub async fn create_item(&self, access_token: &str, item: &ItemCreate) -> Result<Item, BackendError> {
        send_json(self.request(Method::POST, "/items", access_token).json(item)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token, item))]
    pub async fn update_item(&self, access_token: &str, id: i64, item: &ItemUpdate) -> Result<Item, BackendError> {
        send_json(self.request(Method::PUT, &format!("/items/{id}"), access_token).json(item)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token))]
    pub async fn delete_item(&self, access_token: &str, id: i64) -> Result<(), BackendError> {
        send_empty(self.request(Method::DELETE, &format!("/items/{id}"), access_token)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token))]
    pub async fn current_user(&self, access_token: &str) -> Result<UserInfo, BackendError> {
        send_json(self.request(Method::GET, "/users/me", access_token)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token))]
    pub async fn get_profile(&self, access_token: &str) -> Result<UserProfile, BackendError> {
        send_json(self.request(Method::GET, "/users/me/profile", access_token)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token, update))]
    pub async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, BackendError> {
        send_json(self.request(Method::PUT, "/users/me/profile", access_token).json(update)).await
    }

    #[tracing::instrument(err(level = "debug"), skip(self, access_token))]
    pub async fn list_users(&self, access_token: &str) -> Result<Vec<UserProfile>, BackendError> {
        send_json(self.request(Method::GET, "/users", access_token)).await
    }

    /// Any HTTP answer from the backend counts as reachable.
    ///
    /// # Errors
    /// Returns [`BackendError::Transport`] if no response is received.
    pub async fn ping(&self) -> Result<(), BackendError> {
        self.http.get(&self.base_url).send().await?;
        Ok(())
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
    let response = check_status(request.send().await?).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn send_empty(request: RequestBuilder) -> Result<(), BackendError> {
    check_status(request.send().await?).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status { status: status.as_u16(), detail: error_detail(status, &body) })
}

/// Extracts the `detail` message of an error body, falling back to the raw body or status reason.
fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    match parsed.as_ref().and_then(|json| json.get("detail")) {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(other) => other.to_string(),
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status.canonical_reason().unwrap_or("An error occurred").to_string(),
    }
}
