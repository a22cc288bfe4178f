//! The SFU Orchestrator: owns the mediasoup worker pool and the
//! `channel_id -> VoiceRoom` registry, and implements the six signaling
//! operations (`join`, `create_transport`, `connect_transport`,
//! `produce`, `consume`, `leave`) plus the I3 fan-out discipline.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use mediasoup::data_structures::DtlsState;
use mediasoup::prelude::*;
use mediasoup::webrtc_transport::{WebRtcTransportListenInfos, WebRtcTransportOptions, WebRtcTransportRemoteParameters};
use mediasoup::worker::{WorkerSettings};
use mediasoup::worker_manager::WorkerManager;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use vane_common::config::AppConfig;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::participant::Participant;
use crate::room::VoiceRoom;
use crate::types::{
    media_codecs, ConsumeResult, ExistingProducer, JoinResult, OrchestratorEvent, TransportDirection, TransportParams,
};

pub struct Orchestrator {
    self_ref: Weak<Orchestrator>,
    workers: Vec<Worker>,
    next_worker: AtomicUsize,
    rooms: RwLock<HashMap<Uuid, Arc<VoiceRoom>>>,
    announced_ip: String,
    events_tx: broadcast::Sender<OrchestratorEvent>,
}

impl Orchestrator {
    /// Spins up one worker per CPU (bounded pool, per `spec.md` §4.2 —
    /// "owns a single SFU Worker (or a small pool, sized by CPU count)").
    /// On any worker's death the process exits non-zero: the media plane
    /// is unrecoverable without it.
    pub async fn new(config: &AppConfig) -> anyhow::Result<Arc<Self>> {
        let worker_manager = WorkerManager::new();
        let worker_count = num_cpus::get().max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for _ in 0..worker_count {
            let mut settings = WorkerSettings::default();
            settings.rtc_ports_range = config.rtc_min_port..=config.rtc_max_port;
            let worker = worker_manager
                .create_worker(settings)
                .await
                .map_err(|e| anyhow::anyhow!("failed to start mediasoup worker: {e}"))?;

            worker
                .on_close(move || {
                    tracing::error!("sfu worker died, exiting");
                    std::process::exit(1);
                })
                .detach();

            workers.push(worker);
        }

        let (events_tx, _) = broadcast::channel(4096);
        let announced_ip = config.announced_ip.clone();

        Ok(Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            workers,
            next_worker: AtomicUsize::new(0),
            rooms: RwLock::new(HashMap::new()),
            announced_ip,
            events_tx,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events_tx.subscribe()
    }

    fn pick_worker(&self) -> &Worker {
        let idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[idx]
    }

    async fn room(&self, channel_id: Uuid) -> OrchestratorResult<Arc<VoiceRoom>> {
        self.rooms
            .read()
            .await
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound { resource: "channel".to_string() })
    }

    /// Get-or-create with double-checked locking: a read-lock fast path,
    /// then a write-lock re-check before creating the router, so two
    /// racing joins never create two routers for the same channel.
    async fn get_or_create_room(&self, channel_id: Uuid) -> OrchestratorResult<Arc<VoiceRoom>> {
        if let Some(room) = self.rooms.read().await.get(&channel_id).cloned() {
            return Ok(room);
        }

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(&channel_id).cloned() {
            return Ok(room);
        }

        let worker = self.pick_worker();
        let router = worker
            .create_router(RouterOptions::new(media_codecs()))
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!("create router: {e}")))?;

        let room = Arc::new(VoiceRoom::new(channel_id, router));
        rooms.insert(channel_id, room.clone());
        tracing::info!(%channel_id, "voice room created");
        Ok(room)
    }

    async fn drop_room_if_empty(&self, channel_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(&channel_id) else { return };
        if room.is_empty().await {
            rooms.remove(&channel_id);
            tracing::info!(%channel_id, "voice room destroyed");
        }
    }

    /// Idempotent for the same `(conn, channel_id)`: re-joining a channel
    /// a connection is already in just re-returns the current snapshot.
    pub async fn join(&self, conn_id: Uuid, channel_id: Uuid, user_id: Uuid) -> OrchestratorResult<JoinResult> {
        let room = self.get_or_create_room(channel_id).await?;

        if !room.contains(conn_id).await {
            room.insert_participant(Participant::new(conn_id, user_id)).await;
            tracing::debug!(%conn_id, %channel_id, %user_id, "participant joined voice room");
        }

        let rtp_capabilities = room.router.rtp_capabilities().clone();
        let existing_producers = room
            .existing_producers(conn_id)
            .await
            .into_iter()
            .map(|(producer_id, user_id)| ExistingProducer { producer_id, user_id })
            .collect();

        Ok(JoinResult { channel_id, rtp_capabilities, existing_producers })
    }

    pub async fn create_transport(
        &self,
        conn_id: Uuid,
        channel_id: Uuid,
        direction: TransportDirection,
    ) -> OrchestratorResult<TransportParams> {
        let room = self.room(channel_id).await?;
        if !room.contains(conn_id).await {
            return Err(OrchestratorError::InvalidState("not joined to this channel".to_string()));
        }

        let transport = self.create_webrtc_transport(&room.router).await?;
        let params = TransportParams {
            id: transport.id(),
            ice_parameters: transport.ice_parameters().clone(),
            ice_candidates: transport.ice_candidates().to_vec(),
            dtls_parameters: transport.dtls_parameters().clone(),
        };

        match direction {
            TransportDirection::Recv => self.watch_recv_transport_close(&room, conn_id, &transport),
            TransportDirection::Send => self.watch_send_transport_close(&room, conn_id, &transport),
        }

        room.set_transport(conn_id, direction, transport).await;
        Ok(params)
    }

    pub async fn connect_transport(
        &self,
        conn_id: Uuid,
        channel_id: Uuid,
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    ) -> OrchestratorResult<()> {
        let room = self.room(channel_id).await?;
        let transport = room
            .owned_transport_either(conn_id, transport_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound { resource: "transport".to_string() })?;

        transport
            .connect(WebRtcTransportRemoteParameters { dtls_parameters })
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!("connect transport: {e}")))?;
        Ok(())
    }

    pub async fn produce(
        &self,
        conn_id: Uuid,
        channel_id: Uuid,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> OrchestratorResult<ProducerId> {
        let room = self.room(channel_id).await?;
        let transport = room
            .owned_transport(conn_id, TransportDirection::Send, transport_id)
            .await
            .ok_or_else(|| OrchestratorError::InvalidState("no owned send transport".to_string()))?;

        let producer = transport
            .produce(ProducerOptions::new(kind, rtp_parameters))
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!("produce: {e}")))?;

        let producer_id = producer.id();
        let user_id = room
            .user_id_of(conn_id)
            .await
            .ok_or_else(|| OrchestratorError::InvalidState("not joined to this channel".to_string()))?;

        self.watch_producer_close(&room, conn_id, &producer);
        room.add_producer(conn_id, producer).await;

        let _ = self.events_tx.send(OrchestratorEvent::NewProducer { channel_id, except_conn: conn_id, producer_id, user_id });
        tracing::info!(%conn_id, %channel_id, %producer_id, "producer created");
        Ok(producer_id)
    }

    pub async fn consume(
        &self,
        conn_id: Uuid,
        channel_id: Uuid,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
        transport_id: TransportId,
    ) -> OrchestratorResult<ConsumeResult> {
        let room = self.room(channel_id).await?;
        let transport = room
            .owned_transport(conn_id, TransportDirection::Recv, transport_id)
            .await
            .ok_or_else(|| OrchestratorError::InvalidState("no owned recv transport".to_string()))?;

        if !room.find_producer(producer_id).await {
            return Err(OrchestratorError::NotFound { resource: "producer".to_string() });
        }
        if !room.router.can_consume(&producer_id, &rtp_capabilities) {
            return Err(OrchestratorError::IncompatibleCodecs);
        }

        let consumer = transport
            .consume(ConsumerOptions::new(producer_id, rtp_capabilities))
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!("consume: {e}")))?;

        let result = ConsumeResult {
            consumer_id: consumer.id(),
            producer_id: consumer.producer_id(),
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters().clone(),
        };

        room.add_consumer(conn_id, consumer).await;
        tracing::debug!(%conn_id, %channel_id, %producer_id, "consumer created");
        Ok(result)
    }

    /// Idempotent: leaving a channel the connection is not (or no longer)
    /// in is a no-op (R2). Dropping the removed `Participant` closes all
    /// of its transports/producers/consumers; each producer's `on_close`
    /// observer fires the `producer-closed` fan-out.
    pub async fn leave(&self, conn_id: Uuid, channel_id: Uuid) {
        let room = match self.rooms.read().await.get(&channel_id).cloned() {
            Some(room) => room,
            None => return,
        };

        if room.remove_participant(conn_id).await.is_some() {
            tracing::debug!(%conn_id, %channel_id, "participant left voice room");
        }

        self.drop_room_if_empty(channel_id).await;
    }

    async fn create_webrtc_transport(&self, router: &Router) -> OrchestratorResult<WebRtcTransport> {
        let listen_ip: IpAddr = "0.0.0.0".parse().expect("valid IP literal");
        let announced_address = (!self.announced_ip.is_empty()).then(|| self.announced_ip.clone());

        let udp_info = ListenInfo {
            protocol: Protocol::Udp,
            ip: listen_ip,
            announced_address: announced_address.clone(),
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };
        let tcp_info = ListenInfo {
            protocol: Protocol::Tcp,
            ip: listen_ip,
            announced_address,
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };

        let listen_infos = WebRtcTransportListenInfos::new(udp_info).insert(tcp_info);
        let mut transport_options = WebRtcTransportOptions::new(listen_infos);
        transport_options.enable_udp = true;
        transport_options.enable_tcp = true;
        transport_options.prefer_udp = true;

        router
            .create_webrtc_transport(transport_options)
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!("create webrtc transport: {e}")))
    }

    /// A closed recv transport implicitly closes its consumers
    /// (`spec.md` §4.5); no peer needs telling, so this just drops our
    /// own bookkeeping for them.
    fn watch_recv_transport_close(&self, room: &Arc<VoiceRoom>, conn_id: Uuid, transport: &WebRtcTransport) {
        let weak = self.self_ref.clone();
        let room = room.clone();
        transport
            .on_dtls_state_change(move |state| {
                if *state == DtlsState::Closed {
                    if let Some(orch) = weak.upgrade() {
                        let room = room.clone();
                        tokio::spawn(async move {
                            let _ = &orch;
                            room.clear_consumers(conn_id).await;
                        });
                    }
                }
            })
            .detach();
    }

    /// A closed send transport implicitly closes the participant's
    /// producer(s) (`spec.md` §4.5): we drop them here rather than call
    /// any close API directly, so the producer's own `on_close` observer
    /// (registered once in `produce`) fires exactly as it would on an
    /// explicit leave, carrying the `producer-closed` fan-out with it.
    fn watch_send_transport_close(&self, room: &Arc<VoiceRoom>, conn_id: Uuid, transport: &WebRtcTransport) {
        let weak = self.self_ref.clone();
        let room = room.clone();
        transport
            .on_dtls_state_change(move |state| {
                if *state == DtlsState::Closed {
                    if let Some(orch) = weak.upgrade() {
                        let room = room.clone();
                        tokio::spawn(async move {
                            let _ = &orch;
                            let producers = room.take_producers(conn_id).await;
                            drop(producers);
                        });
                    }
                }
            })
            .detach();
    }

    /// A producer's `on_close` fires exactly once for its whole
    /// lifetime — whether closed explicitly on leave, or implicitly by
    /// its send transport closing — so this is the single source of the
    /// `producer-closed` fan-out (I3, P3).
    fn watch_producer_close(&self, room: &Arc<VoiceRoom>, conn_id: Uuid, producer: &Producer) {
        let weak = self.self_ref.clone();
        let room = room.clone();
        let producer_id = producer.id();
        producer
            .on_close(move || {
                if let Some(orch) = weak.upgrade() {
                    let room = room.clone();
                    tokio::spawn(async move {
                        room.remove_producer(producer_id).await;
                        let _ = orch.events_tx.send(OrchestratorEvent::ProducerClosed {
                            channel_id: room.channel_id,
                            except_conn: conn_id,
                            producer_id,
                        });
                        tracing::debug!(%conn_id, %producer_id, "producer closed");
                    });
                }
            })
            .detach();
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZero;

    use vane_common::config::AppConfig;

    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            port: 0,
            frontend_url: String::new(),
            rtc_min_port: 40000,
            rtc_max_port: 41000,
            announced_ip: "127.0.0.1".to_string(),
            store_path: String::new(),
        }
    }

    fn opus_producer_params() -> RtpParameters {
        RtpParameters {
            mid: None,
            codecs: vec![RtpCodecParameters::Audio {
                mime_type: MimeTypeAudio::Opus,
                payload_type: 111,
                clock_rate: NonZero::new(48_000).unwrap(),
                channels: NonZero::new(2).unwrap(),
                parameters: RtpCodecParametersParameters::from([
                    ("useinbandfec", 1u32.into()),
                    ("stereo", 1u32.into()),
                ]),
                rtcp_feedback: vec![RtcpFeedback::TransportCc],
            }],
            header_extensions: vec![],
            encodings: vec![RtpEncodingParameters::default()],
            rtcp: RtcpParameters::default(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn joining_the_same_channel_twice_does_not_duplicate_the_participant() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        let conn = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let user = Uuid::new_v4();

        orch.join(conn, channel, user).await.expect("first join");
        orch.join(conn, channel, user).await.expect("second join is a no-op");

        let room = orch.room(channel).await.expect("room exists");
        assert!(room.contains(conn).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn leaving_a_channel_never_joined_is_a_no_op() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        orch.leave(Uuid::new_v4(), Uuid::new_v4()).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_leave_is_a_no_op() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        let conn = Uuid::new_v4();
        let channel = Uuid::new_v4();
        orch.join(conn, channel, Uuid::new_v4()).await.expect("join");

        orch.leave(conn, channel).await;
        orch.leave(conn, channel).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn leaving_the_last_participant_tears_down_the_room() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        let conn = Uuid::new_v4();
        let channel = Uuid::new_v4();
        orch.join(conn, channel, Uuid::new_v4()).await.expect("join");

        orch.leave(conn, channel).await;

        let err = orch.room(channel).await.expect_err("room was torn down");
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_second_participant_keeps_the_room_alive_after_the_first_leaves() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        let channel = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        orch.join(a, channel, Uuid::new_v4()).await.expect("a joins");
        orch.join(b, channel, Uuid::new_v4()).await.expect("b joins");

        orch.leave(a, channel).await;

        let room = orch.room(channel).await.expect("room still exists");
        assert!(!room.contains(a).await);
        assert!(room.contains(b).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_transport_rejects_a_connection_not_in_the_channel() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        let channel = Uuid::new_v4();
        orch.join(Uuid::new_v4(), channel, Uuid::new_v4()).await.expect("join");

        let err = orch
            .create_transport(Uuid::new_v4(), channel, TransportDirection::Recv)
            .await
            .expect_err("not a member of this channel");
        assert_eq!(err.kind(), "invalid-state");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_transport_fails_for_an_unknown_channel() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        let err = orch
            .create_transport(Uuid::new_v4(), Uuid::new_v4(), TransportDirection::Send)
            .await
            .expect_err("channel was never joined");
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn producing_notifies_the_other_participant_exactly_once_and_leaving_closes_it() {
        let orch = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        let channel = Uuid::new_v4();
        let speaker = Uuid::new_v4();
        let listener = Uuid::new_v4();

        orch.join(speaker, channel, Uuid::new_v4()).await.expect("speaker joins");
        orch.join(listener, channel, Uuid::new_v4()).await.expect("listener joins");

        let mut events = orch.subscribe();
        let transport = orch.create_transport(speaker, channel, TransportDirection::Send).await.expect("send transport");
        let producer_id = orch
            .produce(speaker, channel, transport.id, MediaKind::Audio, opus_producer_params())
            .await
            .expect("produce");

        match events.recv().await.expect("new-producer delivered") {
            OrchestratorEvent::NewProducer { channel_id, except_conn, producer_id: p, .. } => {
                assert_eq!(channel_id, channel);
                assert_eq!(except_conn, speaker);
                assert_eq!(p, producer_id);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        orch.leave(speaker, channel).await;

        match events.recv().await.expect("producer-closed delivered") {
            OrchestratorEvent::ProducerClosed { channel_id, except_conn, producer_id: p } => {
                assert_eq!(channel_id, channel);
                assert_eq!(except_conn, speaker);
                assert_eq!(p, producer_id);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let room = orch.room(channel).await.expect("listener keeps the room alive");
        assert!(!room.contains(speaker).await);
        assert!(room.existing_producers(listener).await.is_empty());
    }
}
