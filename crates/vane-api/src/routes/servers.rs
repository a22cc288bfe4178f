//! Server routes — list and create (`spec.md` §6.1).

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;
use vane_common::error::VaneResult;
use vane_common::models::{CreateServerRequest, Server};
use vane_gateway::ServerEvent;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/servers", get(list_servers).post(create_server))
}

#[derive(Serialize)]
struct ServersResponse {
    servers: Vec<Server>,
}

#[derive(Serialize)]
struct ServerResponse {
    server: Server,
}

/// GET /api/servers
async fn list_servers(State(state): State<Arc<AppState>>) -> Json<ServersResponse> {
    Json(ServersResponse { servers: state.store.list_servers() })
}

/// POST /api/servers — broadcasts `server_created` to every connected client.
async fn create_server(State(state): State<Arc<AppState>>, Json(body): Json<CreateServerRequest>) -> VaneResult<Json<ServerResponse>> {
    body.validate().map_err(|e| vane_common::error::VaneError::BadRequest(e.to_string()))?;

    let server = state.store.create_server(&body.name).await?;
    let _ = state.events_tx.send(ServerEvent::ServerCreated { server: server.clone() });

    tracing::info!(server_id = %server.id, name = %server.name, "server created");
    Ok(Json(ServerResponse { server }))
}
