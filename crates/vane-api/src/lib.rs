//! REST surface for Vane: login-by-username, server/channel CRUD, and
//! message history — everything outside the real-time signaling path.

pub mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;
use vane_gateway::ServerEvent;
use vane_store::Store;

/// Shared application state for every REST handler. `events_tx` is the
/// same broadcast sender `vane-gateway` subscribes from, so `server_created`
/// and `channel_created` reach already-connected clients the instant this
/// layer persists them.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub events_tx: broadcast::Sender<ServerEvent>,
}

/// Builds the REST router, with CORS restricted to `FRONTEND_URL` (plus
/// `localhost:5173`, always permitted for local frontend development —
/// `spec.md` §6.4).
pub fn build_router(state: AppState) -> Router {
    let config = vane_common::config::get();

    let mut allowed_origins: Vec<axum::http::HeaderValue> = vec!["http://localhost:5173".parse().expect("valid origin literal")];
    if !config.frontend_url.is_empty() {
        if let Ok(origin) = config.frontend_url.parse() {
            allowed_origins.push(origin);
        }
    }

    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(true);

    let api_routes =
        Router::new().merge(routes::auth::router()).merge(routes::servers::router()).merge(routes::channels::router()).merge(routes::messages::router()).merge(routes::health::router());

    Router::new().nest("/api", api_routes).layer(cors).layer(tower_http::trace::TraceLayer::new_for_http()).with_state(Arc::new(state))
}
