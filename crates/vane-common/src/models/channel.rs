//! Channel model — either a text channel (holds messages) or a voice
//! channel (joined by the SFU orchestrator; never holds messages).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::message::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    /// Present (possibly empty) for text channels; always empty and
    /// unused for voice channels — voice has no durable history.
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Text,
    Voice,
}

/// `POST /api/servers/{serverId}/channels` request body. `type` defaults
/// to `text` when omitted.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateChannelRequest {
    #[validate(length(min = 1, max = 100, message = "channel name must be 1-100 characters"))]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<ChannelType>,
}
