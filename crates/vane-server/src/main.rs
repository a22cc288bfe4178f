//! # Vane Server
//!
//! Single binary, single port: REST API and the `/gateway` WebSocket share
//! one listener, matching `spec.md` §6.4 (`PORT` is the only listen
//! address the deployment contract names).

use std::net::SocketAddr;
use std::sync::Arc;

use vane_api::{build_router as build_api_router, AppState};
use vane_gateway::GatewayState;
use vane_voice::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = vane_common::config::init()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "vane=info,tower_http=info".into()))
        .with_target(true)
        .init();

    tracing::info!("starting vane v{}", env!("CARGO_PKG_VERSION"));

    let store = vane_store::Store::open(&config.store_path).await;
    let orchestrator = Orchestrator::new(config).await?;

    // Both halves of the server publish onto the same broadcast sender, so
    // a `server_created` from the REST layer and a `new_producer` from the
    // gateway reach every connected client through one pipe.
    let gateway_state = GatewayState::new(store.clone(), orchestrator);
    let events_tx = gateway_state.events_sender();
    let api_state = AppState { store, events_tx };

    let app = build_api_router(api_state).merge(vane_gateway::build_router(gateway_state));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
