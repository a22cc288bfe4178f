//! Wire-adjacent DTOs and the fixed codec set for the orchestrator. These
//! are the payload shapes `vane-gateway` serializes directly into the
//! signaling acks described in the protocol's event table.

use mediasoup::prelude::*;
use serde::{Deserialize, Serialize};
use std::num::NonZero;
use uuid::Uuid;

/// Direction of a participant-owned `WebRtcTransport`. A participant has
/// at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

/// Result of a successful `join`: the router's RTP capabilities the
/// client must load before producing/consuming, plus a snapshot of
/// producers already present in the room.
#[derive(Debug, Clone, Serialize)]
pub struct JoinResult {
    pub channel_id: Uuid,
    pub rtp_capabilities: RtpCapabilitiesFinalized,
    pub existing_producers: Vec<ExistingProducer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExistingProducer {
    pub producer_id: ProducerId,
    pub user_id: Uuid,
}

/// Connection parameters for a freshly created `WebRtcTransport`.
#[derive(Debug, Clone, Serialize)]
pub struct TransportParams {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumeResult {
    pub consumer_id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Domain events the orchestrator pushes out for the gateway to fan out
/// to the right peers. The orchestrator knows *what* happened and to
/// whom it is relevant (everyone in the room but the originator); the
/// gateway knows which live sockets those peers currently own.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    NewProducer { channel_id: Uuid, except_conn: Uuid, producer_id: ProducerId, user_id: Uuid },
    ProducerClosed { channel_id: Uuid, except_conn: Uuid, producer_id: ProducerId },
}

/// The room's fixed codec set: Opus, 48kHz, stereo, in-band FEC — the
/// only codec this system ever routes (`spec.md` §4.2: "audio/opus,
/// 48000 Hz, 2 channels, useinbandfec=1, stereo=1").
pub fn media_codecs() -> Vec<RtpCodecCapability> {
    vec![RtpCodecCapability::Audio {
        mime_type: MimeTypeAudio::Opus,
        preferred_payload_type: Some(111),
        clock_rate: NonZero::new(48_000).unwrap(),
        channels: NonZero::new(2).unwrap(),
        parameters: RtpCodecParametersParameters::from([
            ("useinbandfec", 1u32.into()),
            ("stereo", 1u32.into()),
        ]),
        rtcp_feedback: vec![RtcpFeedback::TransportCc],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_codecs_is_opus_only() {
        let codecs = media_codecs();
        assert_eq!(codecs.len(), 1);
        match &codecs[0] {
            RtpCodecCapability::Audio { mime_type, clock_rate, channels, .. } => {
                assert_eq!(*mime_type, MimeTypeAudio::Opus);
                assert_eq!(clock_rate.get(), 48_000);
                assert_eq!(channels.get(), 2);
            }
            _ => panic!("expected an audio codec"),
        }
    }
}
