//! A connection currently joined to a voice room, with its owned
//! transports/producers/consumers. Holds no back-pointer to its room —
//! the room registry is the only way to reach a room, per the
//! arena/index ownership model.

use mediasoup::prelude::*;
use uuid::Uuid;

pub struct Participant {
    pub conn_id: Uuid,
    pub user_id: Uuid,
    pub send_transport: Option<WebRtcTransport>,
    pub recv_transport: Option<WebRtcTransport>,
    /// At most one in v1 (`spec.md` §3); kept as a `Vec` so a future
    /// multi-producer participant (screen share + mic) is not a shape
    /// change.
    pub producers: Vec<Producer>,
    pub consumers: Vec<Consumer>,
}

impl Participant {
    pub fn new(conn_id: Uuid, user_id: Uuid) -> Self {
        Self {
            conn_id,
            user_id,
            send_transport: None,
            recv_transport: None,
            producers: Vec::new(),
            consumers: Vec::new(),
        }
    }

    pub fn transport(&self, direction: super::types::TransportDirection) -> Option<&WebRtcTransport> {
        match direction {
            super::types::TransportDirection::Send => self.send_transport.as_ref(),
            super::types::TransportDirection::Recv => self.recv_transport.as_ref(),
        }
    }
}
