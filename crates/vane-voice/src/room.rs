//! A `VoiceRoom` is bound to one voice channel and owns one mediasoup
//! `Router` plus its participants. Exists iff it has at least one
//! participant (I2); participants are stored by value keyed on
//! `conn_id`, never reached through a back-pointer from `Participant`.

use std::collections::HashMap;

use mediasoup::prelude::*;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::participant::Participant;
use crate::types::TransportDirection;

pub struct VoiceRoom {
    pub channel_id: Uuid,
    pub router: Router,
    participants: RwLock<HashMap<Uuid, Participant>>,
}

impl VoiceRoom {
    pub fn new(channel_id: Uuid, router: Router) -> Self {
        Self { channel_id, router, participants: RwLock::new(HashMap::new()) }
    }

    pub async fn is_empty(&self) -> bool {
        self.participants.read().await.is_empty()
    }

    pub async fn contains(&self, conn_id: Uuid) -> bool {
        self.participants.read().await.contains_key(&conn_id)
    }

    pub async fn insert_participant(&self, participant: Participant) {
        self.participants.write().await.insert(participant.conn_id, participant);
    }

    /// Removes and returns the participant; dropping the returned value
    /// closes its transports/producers/consumers (mediasoup handles close
    /// their underlying resources on `Drop`), satisfying I5.
    pub async fn remove_participant(&self, conn_id: Uuid) -> Option<Participant> {
        self.participants.write().await.remove(&conn_id)
    }

    pub async fn user_id_of(&self, conn_id: Uuid) -> Option<Uuid> {
        self.participants.read().await.get(&conn_id).map(|p| p.user_id)
    }

    /// Snapshot of producers belonging to everyone but `exclude`, for the
    /// `existing-producers` message sent on join.
    pub async fn existing_producers(&self, exclude: Uuid) -> Vec<(ProducerId, Uuid)> {
        self.participants
            .read()
            .await
            .values()
            .filter(|p| p.conn_id != exclude)
            .flat_map(|p| p.producers.iter().map(move |pr| (pr.id(), p.user_id)))
            .collect()
    }

    pub async fn set_transport(&self, conn_id: Uuid, direction: TransportDirection, transport: WebRtcTransport) {
        let mut participants = self.participants.write().await;
        if let Some(p) = participants.get_mut(&conn_id) {
            match direction {
                TransportDirection::Send => p.send_transport = Some(transport),
                TransportDirection::Recv => p.recv_transport = Some(transport),
            }
        }
    }

    /// Returns a clone of `conn_id`'s transport for `direction`, only if
    /// its id matches `transport_id` — guards against a client naming a
    /// transport it does not own.
    pub async fn owned_transport(
        &self,
        conn_id: Uuid,
        direction: TransportDirection,
        transport_id: TransportId,
    ) -> Option<WebRtcTransport> {
        let participants = self.participants.read().await;
        let transport = participants.get(&conn_id)?.transport(direction)?;
        (transport.id() == transport_id).then(|| transport.clone())
    }

    /// Like [`Self::owned_transport`] but searches both directions —
    /// used by `connect-transport`, which does not carry a direction.
    pub async fn owned_transport_either(&self, conn_id: Uuid, transport_id: TransportId) -> Option<WebRtcTransport> {
        let participants = self.participants.read().await;
        let p = participants.get(&conn_id)?;
        for t in [p.send_transport.as_ref(), p.recv_transport.as_ref()].into_iter().flatten() {
            if t.id() == transport_id {
                return Some(t.clone());
            }
        }
        None
    }

    pub async fn add_producer(&self, conn_id: Uuid, producer: Producer) {
        let mut participants = self.participants.write().await;
        if let Some(p) = participants.get_mut(&conn_id) {
            p.producers.push(producer);
        }
    }

    /// Removes and returns `conn_id`'s producers without closing them
    /// itself — the caller drops the returned `Vec` after releasing any
    /// lock it holds, which triggers each producer's `on_close` observer
    /// (the single source of the `producer-closed` fan-out).
    pub async fn take_producers(&self, conn_id: Uuid) -> Vec<Producer> {
        let mut participants = self.participants.write().await;
        match participants.get_mut(&conn_id) {
            Some(p) => std::mem::take(&mut p.producers),
            None => Vec::new(),
        }
    }

    /// Removes a producer from whichever participant owns it (if any is
    /// still tracking it — a no-op if the participant already left).
    pub async fn remove_producer(&self, producer_id: ProducerId) {
        let mut participants = self.participants.write().await;
        for p in participants.values_mut() {
            p.producers.retain(|pr| pr.id() != producer_id);
        }
    }

    pub async fn find_producer(&self, producer_id: ProducerId) -> bool {
        self.participants.read().await.values().any(|p| p.producers.iter().any(|pr| pr.id() == producer_id))
    }

    pub async fn add_consumer(&self, conn_id: Uuid, consumer: Consumer) {
        let mut participants = self.participants.write().await;
        if let Some(p) = participants.get_mut(&conn_id) {
            p.consumers.push(consumer);
        }
    }

    pub async fn clear_consumers(&self, conn_id: Uuid) {
        let mut participants = self.participants.write().await;
        if let Some(p) = participants.get_mut(&conn_id) {
            p.consumers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use mediasoup::router::RouterOptions;
    use mediasoup::worker::WorkerSettings;
    use mediasoup::worker_manager::WorkerManager;

    use super::*;
    use crate::types::media_codecs;

    async fn test_router() -> Router {
        let manager = WorkerManager::new();
        let worker = manager.create_worker(WorkerSettings::default()).await.expect("create worker");
        worker.create_router(RouterOptions::new(media_codecs())).await.expect("create router")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn room_is_empty_until_a_participant_joins() {
        let room = VoiceRoom::new(Uuid::new_v4(), test_router().await);
        assert!(room.is_empty().await);

        let conn = Uuid::new_v4();
        room.insert_participant(Participant::new(conn, Uuid::new_v4())).await;
        assert!(!room.is_empty().await);
        assert!(room.contains(conn).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removing_the_last_participant_empties_the_room() {
        let room = VoiceRoom::new(Uuid::new_v4(), test_router().await);
        let conn = Uuid::new_v4();
        room.insert_participant(Participant::new(conn, Uuid::new_v4())).await;

        assert!(room.remove_participant(conn).await.is_some());
        assert!(room.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_participant_is_idempotent() {
        let room = VoiceRoom::new(Uuid::new_v4(), test_router().await);
        let conn = Uuid::new_v4();
        room.insert_participant(Participant::new(conn, Uuid::new_v4())).await;

        assert!(room.remove_participant(conn).await.is_some());
        assert!(room.remove_participant(conn).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn existing_producers_excludes_the_caller_and_sees_nobody_before_anyone_produces() {
        let room = VoiceRoom::new(Uuid::new_v4(), test_router().await);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        room.insert_participant(Participant::new(a, Uuid::new_v4())).await;
        room.insert_participant(Participant::new(b, Uuid::new_v4())).await;

        assert!(room.existing_producers(a).await.is_empty());
        assert!(room.existing_producers(b).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn take_producers_on_a_participant_with_none_is_an_empty_vec() {
        let room = VoiceRoom::new(Uuid::new_v4(), test_router().await);
        let conn = Uuid::new_v4();
        room.insert_participant(Participant::new(conn, Uuid::new_v4())).await;

        assert!(room.take_producers(conn).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn take_producers_on_an_unknown_connection_does_not_panic() {
        let room = VoiceRoom::new(Uuid::new_v4(), test_router().await);
        assert!(room.take_producers(Uuid::new_v4()).await.is_empty());
    }
}
