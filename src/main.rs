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

use keycloak_session_gateway::config::Config;
use keycloak_session_gateway::{App, telemetry};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    keycloak_session_gateway::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (api_listener, mgmt_listener, app, shutdown_rx) = async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        keycloak_session_gateway::spawn_signal_handler(shutdown_tx);

        tracing::info!(issuer = %config.keycloak.issuer, backend = %config.backend.url, "configuring gateway");
        let app = App::build(config.clone())?;

        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        Ok::<_, anyhow::Error>((api_listener, mgmt_listener, app, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app.api.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = api_rx.wait_for(|&s| s).await;
        });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, app.mgmt.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = mgmt_rx.wait_for(|&s| s).await;
        });

    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_secs);
    let servers = async { tokio::try_join!(api_server, mgmt_server) };

    let mut drain_rx = shutdown_rx;
    tokio::select! {
        result = servers => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server error");
            }
        }
        () = async {
            let _ = drain_rx.wait_for(|&s| s).await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!("Timeout waiting for in-flight requests to finish.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}
