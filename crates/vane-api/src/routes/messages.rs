//! Message history (`spec.md` §6.1). Sending happens over the gateway, not
//! REST — this route is read-only.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use vane_common::error::VaneResult;
use vane_common::models::Message;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/servers/{server_id}/channels/{channel_id}/messages", get(get_messages))
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

/// GET /api/servers/:server_id/channels/:channel_id/messages — `404` if
/// the server or channel does not exist.
async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path((server_id, channel_id)): Path<(Uuid, Uuid)>,
) -> VaneResult<Json<MessagesResponse>> {
    let messages = state.store.get_messages(server_id, channel_id)?;
    Ok(Json(MessagesResponse { messages }))
}
