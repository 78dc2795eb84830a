use crate::domain::token_set::ExpiryMode;
use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub keycloak: KeycloakConfig,

    #[command(flatten)]
    pub session: SessionConfig,

    #[command(flatten)]
    pub backend: BackendConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management (liveness/readiness) server
    #[arg(long, env = "GATEWAY_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Externally visible base URL of this gateway, used to build OIDC redirect URIs
    #[arg(long, env = "GATEWAY_PUBLIC_URL", default_value = "http://localhost:3000")]
    pub public_url: String,

    /// Path prefixes that redirect to the landing page when no session is present
    #[arg(
        long,
        env = "GATEWAY_PROTECTED_PATHS",
        default_value = "/dashboard,/items,/profile,/admin",
        value_delimiter = ','
    )]
    pub protected_paths: Vec<String>,

    /// Seconds to wait for in-flight requests during shutdown
    #[arg(long, env = "GATEWAY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct KeycloakConfig {
    /// Realm issuer URL, e.g. http://localhost:8080/realms/demo
    #[arg(long = "keycloak-issuer", env = "KEYCLOAK_ISSUER")]
    pub issuer: String,

    /// OIDC client id registered in the realm
    #[arg(long = "keycloak-client-id", env = "KEYCLOAK_CLIENT_ID")]
    pub client_id: String,

    /// OIDC client secret
    #[arg(long = "keycloak-client-secret", env = "KEYCLOAK_CLIENT_SECRET")]
    pub client_secret: String,

    /// Scopes requested at sign-in
    #[arg(long = "keycloak-scopes", env = "KEYCLOAK_SCOPES", default_value = "openid profile email")]
    pub scopes: String,

    /// How a bare `expires_at` in a token response is interpreted
    #[arg(long, env = "KEYCLOAK_EXPIRY_MODE", value_enum, default_value_t = ExpiryMode::Relative)]
    pub expiry_mode: ExpiryMode,

    /// Timeout for calls to the identity provider
    #[arg(
        id = "provider_timeout_secs",
        long = "provider-timeout-secs",
        env = "KEYCLOAK_TIMEOUT_SECS",
        default_value_t = 10
    )]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct SessionConfig {
    /// Secret key used to sign session cookies
    #[arg(long = "session-secret", env = "GATEWAY_SESSION_SECRET")]
    pub secret: String,

    /// Session lifetime in seconds (default: 30 days)
    #[arg(long = "session-max-age-secs", env = "GATEWAY_SESSION_MAX_AGE_SECS", default_value_t = 2_592_000)]
    pub max_age_secs: u64,

    /// Mark cookies `Secure` (enable when served over HTTPS)
    #[arg(long = "cookie-secure", env = "GATEWAY_COOKIE_SECURE", default_value_t = false)]
    pub cookie_secure: bool,
}

#[derive(Clone, Debug, Args)]
pub struct BackendConfig {
    /// Base URL of the items/profile REST API
    #[arg(long = "backend-url", env = "GATEWAY_BACKEND_URL", default_value = "http://localhost:8000/api")]
    pub url: String,

    /// Timeout for calls to the backend
    #[arg(
        id = "backend_timeout_secs",
        long = "backend-timeout-secs",
        env = "GATEWAY_BACKEND_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the identity provider readiness probe
    #[arg(long, env = "GATEWAY_HEALTH_PROVIDER_TIMEOUT_MS", default_value_t = 2000)]
    pub provider_timeout_ms: u64,

    /// Timeout for the backend readiness probe
    #[arg(long, env = "GATEWAY_HEALTH_BACKEND_TIMEOUT_MS", default_value_t = 2000)]
    pub backend_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "GATEWAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces and metrics are exported only when set
    #[arg(long, env = "GATEWAY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl ServerConfig {
    /// Redirect URI registered with Keycloak for the authorization-code callback.
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("{}/api/auth/callback/keycloak", self.public_url.trim_end_matches('/'))
    }

    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_paths.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            !prefix.is_empty()
                && path.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}
