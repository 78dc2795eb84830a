#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::backend::BackendClient;
use crate::adapters::keycloak::KeycloakClient;
use crate::api::cookies::CookiePolicy;
use crate::api::{AppState, MgmtState};
use crate::config::Config;
use crate::services::health_service::HealthService;
use crate::services::session_codec::SessionCodec;
use crate::services::sign_in_service::SignInService;
use crate::services::token_endpoint::TokenEndpoint;
use crate::services::token_lifecycle::TokenLifecycleManager;
use std::sync::Arc;
use tokio::sync::watch;

/// Routers for the public API and the management port.
#[derive(Debug)]
pub struct App {
    pub api: axum::Router,
    pub mgmt: axum::Router,
}

impl App {
    /// Wires clients and services from configuration. Performs no I/O.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let keycloak = Arc::new(KeycloakClient::new(&config.keycloak)?);
        let backend = BackendClient::new(&config.backend)?;

        let session_codec = SessionCodec::new(&config.session);
        let endpoint: Arc<dyn TokenEndpoint> = Arc::clone(&keycloak) as Arc<dyn TokenEndpoint>;
        let token_manager = TokenLifecycleManager::new(endpoint, config.keycloak.expiry_mode);
        let sign_in_service = SignInService::new(
            Arc::clone(&keycloak),
            session_codec.clone(),
            config.keycloak.expiry_mode,
            config.server.callback_url(),
            config.server.public_url.trim_end_matches('/').to_string(),
        );
        let health_service = HealthService::new(Arc::clone(&keycloak), backend.clone(), config.health.clone());
        let cookie_policy =
            CookiePolicy { secure: config.session.cookie_secure, max_age_secs: config.session.max_age_secs };

        let state = AppState {
            config: Arc::new(config),
            token_manager,
            session_codec,
            sign_in_service,
            backend,
            cookie_policy,
        };

        Ok(Self { api: api::app_router(state), mgmt: api::mgmt_router(MgmtState { health_service }) })
    }
}

/// Flips the shutdown channel on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log output.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(location = %location, panic = %payload, "Panic occurred");
    }));
}
