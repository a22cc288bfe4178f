//! Channel creation under a server (`spec.md` §6.1).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;
use vane_common::error::VaneResult;
use vane_common::models::{Channel, ChannelType, CreateChannelRequest};
use vane_gateway::ServerEvent;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/servers/{server_id}/channels", post(create_channel))
}

#[derive(Serialize)]
struct ChannelResponse {
    channel: Channel,
}

/// POST /api/servers/:server_id/channels — `type` defaults to `text`;
/// broadcasts `channel_created` to every connected client.
async fn create_channel(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<Uuid>,
    Json(body): Json<CreateChannelRequest>,
) -> VaneResult<Json<ChannelResponse>> {
    body.validate().map_err(|e| vane_common::error::VaneError::BadRequest(e.to_string()))?;

    let kind = body.kind.unwrap_or(ChannelType::Text);
    let channel = state.store.create_channel(server_id, &body.name, kind).await?;
    let _ = state.events_tx.send(ServerEvent::ChannelCreated { server_id, channel: channel.clone() });

    tracing::info!(channel_id = %channel.id, %server_id, name = %channel.name, "channel created");
    Ok(Json(ChannelResponse { channel }))
}
