#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub,
    dead_code
)]
use axum::{
    Form, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use keycloak_session_gateway::App;
use keycloak_session_gateway::config::{
    BackendConfig, Config, HealthConfig, KeycloakConfig, LogFormat, ServerConfig, SessionConfig, TelemetryConfig,
};
use keycloak_session_gateway::domain::token_set::ExpiryMode;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::net::TcpListener;

static INIT: Once = Once::new();

pub const REALM_PATH: &str = "/realms/demo";
pub const CLIENT_ID: &str = "gateway";
pub const CLIENT_SECRET: &str = "gateway-secret";
pub const GOOD_CODE: &str = "good-code";

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("keycloak_session_gateway=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Fake identity provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum RefreshReply {
    Tokens { access_token: String, refresh_token: Option<String>, expires_in: i64 },
    /// `expires_at` only, no `expires_in`.
    TokensExpiresAt { access_token: String, refresh_token: Option<String>, expires_at: i64 },
    Status(u16),
    Garbage,
}

#[derive(Debug)]
pub struct FakeIdp {
    pub refresh_calls: AtomicUsize,
    pub refresh_reply: Mutex<RefreshReply>,
    pub initial_expires_in: AtomicI64,
    pub last_refresh_form: Mutex<HashMap<String, String>>,
}

impl Default for FakeIdp {
    fn default() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            refresh_reply: Mutex::new(RefreshReply::Tokens {
                access_token: "A2".to_string(),
                refresh_token: Some("R2".to_string()),
                expires_in: 3600,
            }),
            initial_expires_in: AtomicI64::new(300),
            last_refresh_form: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeIdp {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    pub fn set_initial_expires_in(&self, secs: i64) {
        self.initial_expires_in.store(secs, Ordering::SeqCst);
    }
}

fn oauth_error(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

async fn idp_token(State(idp): State<Arc<FakeIdp>>, Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("client_id").map(String::as_str) != Some(CLIENT_ID)
        || form.get("client_secret").map(String::as_str) != Some(CLIENT_SECRET)
    {
        return oauth_error(StatusCode::UNAUTHORIZED, "invalid_client");
    }

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            let has_verifier = form.get("code_verifier").is_some_and(|v| !v.is_empty());
            if form.get("code").map(String::as_str) != Some(GOOD_CODE) || !has_verifier {
                return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant");
            }
            Json(json!({
                "access_token": "A1",
                "id_token": "I1",
                "refresh_token": "R1",
                "token_type": "Bearer",
                "expires_in": idp.initial_expires_in.load(Ordering::SeqCst),
            }))
            .into_response()
        }
        Some("refresh_token") => {
            idp.refresh_calls.fetch_add(1, Ordering::SeqCst);
            *idp.last_refresh_form.lock().unwrap() = form;
            let reply = idp.refresh_reply.lock().unwrap().clone();
            match reply {
                RefreshReply::Tokens { access_token, refresh_token, expires_in } => Json(json!({
                    "access_token": access_token,
                    "refresh_token": refresh_token,
                    "expires_in": expires_in,
                }))
                .into_response(),
                RefreshReply::TokensExpiresAt { access_token, refresh_token, expires_at } => Json(json!({
                    "access_token": access_token,
                    "refresh_token": refresh_token,
                    "expires_at": expires_at,
                }))
                .into_response(),
                RefreshReply::Status(status) => {
                    oauth_error(StatusCode::from_u16(status).unwrap(), "invalid_grant")
                }
                RefreshReply::Garbage => (StatusCode::OK, "<html>gateway timeout</html>").into_response(),
            }
        }
        _ => oauth_error(StatusCode::BAD_REQUEST, "unsupported_grant_type"),
    }
}

async fn idp_userinfo(headers: HeaderMap) -> Response {
    if bearer(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "sub": "user-1",
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "preferred_username": "ada",
        "realm_access": { "roles": ["user"] }
    }))
    .into_response()
}

async fn idp_discovery() -> Json<serde_json::Value> {
    Json(json!({ "issuer": "fake" }))
}

fn idp_router(idp: Arc<FakeIdp>) -> Router {
    Router::new()
        .route(&format!("{REALM_PATH}/protocol/openid-connect/token"), post(idp_token))
        .route(&format!("{REALM_PATH}/protocol/openid-connect/userinfo"), get(idp_userinfo))
        .route(&format!("{REALM_PATH}/.well-known/openid-configuration"), get(idp_discovery))
        .with_state(idp)
}

// ---------------------------------------------------------------------------
// Fake items backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub items: Mutex<Vec<serde_json::Value>>,
    pub next_id: AtomicI64,
    pub seen_tokens: Mutex<Vec<String>>,
    pub seen_requests: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn last_token(&self) -> Option<String> {
        self.seen_tokens.lock().unwrap().last().cloned()
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Path and query of the most recent request the backend received.
    pub fn last_request(&self) -> Option<String> {
        self.seen_requests.lock().unwrap().last().cloned()
    }

    pub fn seed_item(&self, owner_id: &str, title: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.items.lock().unwrap().push(json!({
            "id": id,
            "title": title,
            "description": null,
            "owner_id": owner_id,
        }));
        id
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn authorize(backend: &FakeBackend, headers: &HeaderMap) -> Result<String, Response> {
    let token = bearer(headers)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Not authenticated" }))).into_response())?;
    backend.seen_tokens.lock().unwrap().push(token.clone());
    Ok(token)
}

async fn record_request(State(backend): State<Arc<FakeBackend>>, request: Request, next: Next) -> Response {
    let target = request.uri().path_and_query().map(ToString::to_string).unwrap_or_default();
    backend.seen_requests.lock().unwrap().push(target);
    next.run(request).await
}

fn owned_by(items: &[serde_json::Value], owner_id: &str) -> Vec<serde_json::Value> {
    items.iter().filter(|item| item["owner_id"] == owner_id).cloned().collect()
}

fn item_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Item not found" }))).into_response()
}

async fn backend_list_items(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    let items = backend.items.lock().unwrap();
    if query.get("all_items").map(String::as_str) == Some("true") {
        Json(items.clone()).into_response()
    } else {
        Json(owned_by(&items, "user-1")).into_response()
    }
}

async fn backend_list_my_items(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    let mine = owned_by(&backend.items.lock().unwrap(), "user-1");
    Json(mine).into_response()
}

async fn backend_create_item(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    let id = backend.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let item = json!({
        "id": id,
        "title": payload["title"],
        "description": payload.get("description").cloned().unwrap_or(serde_json::Value::Null),
        "owner_id": "user-1",
    });
    backend.items.lock().unwrap().push(item.clone());
    (StatusCode::CREATED, Json(item)).into_response()
}

async fn backend_get_item(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    let items = backend.items.lock().unwrap();
    items.iter().find(|item| item["id"] == id).map_or_else(item_not_found, |item| Json(item.clone()).into_response())
}

async fn backend_update_item(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    let mut items = backend.items.lock().unwrap();
    let Some(item) = items.iter_mut().find(|item| item["id"] == id) else {
        return item_not_found();
    };
    for field in ["title", "description"] {
        if let Some(value) = payload.get(field) {
            item[field] = value.clone();
        }
    }
    Json(item.clone()).into_response()
}

async fn backend_delete_item(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    let mut items = backend.items.lock().unwrap();
    let before = items.len();
    items.retain(|item| item["id"] != id);
    if items.len() == before {
        return item_not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn backend_users_me(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    Json(json!({
        "sub": "user-1",
        "email": "ada@example.com",
        "preferredUsername": "ada",
        "realmAccess": { "roles": ["user"] }
    }))
    .into_response()
}

async fn backend_profile(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    Json(json!({ "id": "user-1", "username": "ada", "company": "Analytical Engines" })).into_response()
}

async fn backend_update_profile(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    Json(json!({
        "id": "user-1",
        "username": "ada",
        "company": payload.get("company").cloned().unwrap_or(serde_json::Value::Null),
        "phone": payload.get("phone").cloned().unwrap_or(serde_json::Value::Null),
    }))
    .into_response()
}

async fn backend_list_users(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&backend, &headers) {
        return resp;
    }
    (StatusCode::FORBIDDEN, Json(json!({ "detail": "Insufficient permissions" }))).into_response()
}

fn backend_router(backend: Arc<FakeBackend>) -> Router {
    Router::new()
        .route("/api", get(|| async { StatusCode::NOT_FOUND }))
        .route("/api/items", get(backend_list_items).post(backend_create_item))
        .route("/api/items/me", get(backend_list_my_items))
        .route("/api/items/{id}", get(backend_get_item).put(backend_update_item).delete(backend_delete_item))
        .route("/api/users", get(backend_list_users))
        .route("/api/users/me", get(backend_users_me))
        .route("/api/users/me/profile", get(backend_profile).put(backend_update_profile))
        .layer(from_fn_with_state(Arc::clone(&backend), record_request))
        .with_state(backend)
}

// ---------------------------------------------------------------------------
// Gateway under test
// ---------------------------------------------------------------------------

pub fn get_test_config(issuer: &str, backend_url: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            mgmt_port: 0,
            public_url: "http://localhost:3000".to_string(),
            protected_paths: vec![
                "/dashboard".to_string(),
                "/items".to_string(),
                "/profile".to_string(),
                "/admin".to_string(),
            ],
            shutdown_timeout_secs: 1,
        },
        keycloak: KeycloakConfig {
            issuer: issuer.to_string(),
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            scopes: "openid profile email".to_string(),
            expiry_mode: ExpiryMode::Relative,
            timeout_secs: 5,
        },
        session: SessionConfig { secret: "test_session_secret".to_string(), max_age_secs: 3600, cookie_secure: false },
        backend: BackendConfig { url: backend_url.to_string(), timeout_secs: 5 },
        health: HealthConfig { provider_timeout_ms: 1000, backend_timeout_ms: 1000 },
        telemetry: TelemetryConfig { log_format: LogFormat::Text, otlp_endpoint: None },
    }
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub idp_url: String,
    pub backend_url: String,
    pub idp: Arc<FakeIdp>,
    pub backend: Arc<FakeBackend>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|config| config).await
    }

    /// Spawns the fakes and a gateway whose config may be adjusted first.
    pub async fn spawn_with(adjust: impl FnOnce(Config) -> Config) -> Self {
        setup_tracing();

        let idp = Arc::new(FakeIdp::default());
        let backend = Arc::new(FakeBackend::default());
        let idp_url = serve(idp_router(Arc::clone(&idp))).await;
        let backend_url = serve(backend_router(Arc::clone(&backend))).await;

        let config = adjust(get_test_config(&format!("{idp_url}{REALM_PATH}"), &format!("{backend_url}/api")));
        let app = App::build(config).unwrap();
        let server_url = serve(app.api).await;
        let mgmt_url = serve(app.mgmt).await;

        let client = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap();

        Self { server_url, mgmt_url, idp_url, backend_url, idp, backend, client }
    }

    /// Runs the full authorization-code sign-in and returns the session `Cookie` header value.
    pub async fn sign_in(&self) -> String {
        let resp = self
            .client
            .get(format!("{}/api/auth/signin?callbackUrl=/dashboard", self.server_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let state = state_param(&location(&resp));
        let login_cookie = cookie_header(&resp);

        let resp = self
            .client
            .get(format!("{}/api/auth/callback/keycloak?code={GOOD_CODE}&state={state}", self.server_url))
            .header(header::COOKIE, login_cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/dashboard");

        session_cookie(&resp).expect("callback must set the session cookie")
    }

    /// Signs in with a one-second access token and waits until it has expired.
    pub async fn sign_in_expired(&self) -> String {
        self.idp.set_initial_expires_in(1);
        let cookie = self.sign_in().await;
        wait_for_expiry().await;
        cookie
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{path}", self.server_url));
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        request.send().await.unwrap()
    }
}

/// Long enough for a one-second token to fall behind the whole-second clock.
pub async fn wait_for_expiry() {
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
}

pub fn location(resp: &reqwest::Response) -> String {
    resp.headers()[header::LOCATION].to_str().unwrap().to_string()
}

pub fn state_param(location: &str) -> String {
    let url = reqwest::Url::parse(location).unwrap();
    url.query_pairs().find(|(key, _)| key == "state").map(|(_, value)| value.into_owned()).unwrap()
}

/// `name=value` pairs of every cookie the response sets (not clears), joined for a `Cookie` header.
pub fn cookie_header(resp: &reqwest::Response) -> String {
    set_cookies(resp)
        .into_iter()
        .filter(|cookie| !cookie.contains("Max-Age=0"))
        .filter_map(|cookie| cookie.split(';').next().map(str::to_string))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn set_cookies(resp: &reqwest::Response) -> Vec<String> {
    resp.headers().get_all(header::SET_COOKIE).iter().map(|v| v.to_str().unwrap().to_string()).collect()
}

/// The session cookie set by the response, if any.
pub fn session_cookie(resp: &reqwest::Response) -> Option<String> {
    let pairs: Vec<String> = set_cookies(resp)
        .into_iter()
        .filter(|cookie| cookie.starts_with("gateway.session-token") && !cookie.contains("Max-Age=0"))
        .filter_map(|cookie| cookie.split(';').next().map(str::to_string))
        .collect();
    if pairs.is_empty() { None } else { Some(pairs.join("; ")) }
}
