//! The signaling wire protocol: a tagged union of inbound client events
//! and a tagged union of outbound server events, plus the ack envelope
//! used for the four request-reply events (`create-transport`,
//! `connect-transport`, `produce`, `consume`).

use mediasoup::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vane_common::models::{Channel, Message, Server, UserRef};
use vane_voice::{ExistingProducer, TransportDirection};

/// One inbound frame: an event plus an optional ack correlation id. Only
/// the four request-reply events in the protocol table populate `ack_id`
/// with meaning — the gateway ignores it on fire-and-forget events.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub ack_id: Option<u64>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "user_online")]
    UserOnline { user: UserRef },

    #[serde(rename = "send_message")]
    SendMessage { server_id: Uuid, channel_id: Uuid, content: String, user: UserRef },

    #[serde(rename = "join_voice_channel")]
    JoinVoiceChannel { channel_id: Uuid, user_id: Uuid },

    #[serde(rename = "leave_voice_channel")]
    LeaveVoiceChannel { channel_id: Uuid },

    #[serde(rename = "create-transport")]
    CreateTransport { channel_id: Uuid, direction: TransportDirection },

    #[serde(rename = "connect-transport")]
    ConnectTransport { channel_id: Uuid, transport_id: TransportId, dtls_parameters: DtlsParameters },

    #[serde(rename = "produce")]
    Produce { channel_id: Uuid, transport_id: TransportId, kind: MediaKind, rtp_parameters: RtpParameters },

    #[serde(rename = "consume")]
    Consume { channel_id: Uuid, producer_id: ProducerId, rtp_capabilities: RtpCapabilities, transport_id: TransportId },

    #[serde(rename = "user_speaking")]
    UserSpeaking { channel_id: Uuid, speaking: bool },
}

/// A reply to an acked inbound event: `{ack_id, success: true, ...params}`
/// or `{ack_id, success: false, error}` — never both, never neither.
#[derive(Debug, Serialize)]
pub struct AckFrame {
    pub ack_id: u64,
    #[serde(flatten)]
    pub result: AckResult,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AckResult {
    Success {
        success: bool,
        #[serde(flatten)]
        params: serde_json::Value,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl AckResult {
    pub fn ok(params: impl Serialize) -> Self {
        Self::Success { success: true, params: serde_json::to_value(params).unwrap_or(serde_json::Value::Null) }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self::Failure { success: false, error: message.into() }
    }
}

/// Unsolicited server-to-client pushes: membership snapshots, producer
/// fan-out, and the domain events from identity/text-message mutations.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "users_update")]
    UsersUpdate { users: Vec<UserRef> },

    #[serde(rename = "voice_channel_users_update")]
    VoiceChannelUsersUpdate { channel_id: Uuid, users: Vec<UserRef> },

    #[serde(rename = "router-rtp-capabilities")]
    RouterRtpCapabilities { rtp_capabilities: RtpCapabilitiesFinalized },

    #[serde(rename = "existing-producers")]
    ExistingProducers { producers: Vec<ExistingProducer> },

    #[serde(rename = "new-producer")]
    NewProducer { producer_id: ProducerId, user_id: Uuid },

    #[serde(rename = "producer-closed")]
    ProducerClosed { producer_id: ProducerId },

    #[serde(rename = "user_speaking_update")]
    UserSpeakingUpdate { conn_id: Uuid, speaking: bool },

    #[serde(rename = "server_created")]
    ServerCreated { server: Server },

    #[serde(rename = "channel_created")]
    ChannelCreated { server_id: Uuid, channel: Channel },

    #[serde(rename = "new_message")]
    NewMessage { server_id: Uuid, channel_id: Uuid, message: Message },
}
