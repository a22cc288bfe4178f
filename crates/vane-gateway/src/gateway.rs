//! The websocket front door: upgrades each connection, owns its receive
//! loop, and translates client events into orchestrator/store calls and
//! orchestrator/domain events back into client-facing pushes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use validator::Validate;
use vane_common::models::{SendMessageRequest, UserRef};
use vane_store::Store;
use vane_voice::{Orchestrator, OrchestratorEvent};

use crate::membership::MembershipIndex;
use crate::presence::PresenceRegistry;
use crate::protocol::{AckFrame, AckResult, ClientEvent, ClientFrame, ServerEvent};
use crate::session::Session;

/// The signaling-call timeout suggested by `spec.md` §5: a request-reply
/// event that does not complete in this window fails with `internal` and
/// leaves no partially constructed resource behind.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound queue depth before a connection is considered backed up and
/// closed (`spec.md` §4.1 backpressure clause).
const OUTBOUND_HIGH_WATER_MARK: usize = 256;

#[derive(Clone)]
pub struct GatewayState {
    pub store: Store,
    pub orchestrator: Arc<Orchestrator>,
    pub presence: Arc<PresenceRegistry>,
    pub membership: Arc<MembershipIndex>,
    pub events_tx: broadcast::Sender<ServerEvent>,
}

impl GatewayState {
    pub fn new(store: Store, orchestrator: Arc<Orchestrator>) -> Self {
        let (events_tx, _) = broadcast::channel(10_000);
        Self { store, orchestrator, presence: Arc::new(PresenceRegistry::new()), membership: Arc::new(MembershipIndex::new()), events_tx }
    }

    /// Share this gateway's event bus with another state (e.g. the REST
    /// layer) so `server_created`/`channel_created` reach every connected
    /// client through the same pipe voice and presence events use.
    pub fn events_sender(&self) -> broadcast::Sender<ServerEvent> {
        self.events_tx.clone()
    }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new().route("/gateway", get(ws_handler)).with_state(Arc::new(state))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_HIGH_WATER_MARK);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut broadcast_rx = state.events_tx.subscribe();
    let mut orchestrator_rx = state.orchestrator.subscribe();
    let mut session = Session::new(Uuid::new_v4());

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !dispatch_frame(&text, &mut session, &state, &out_tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => { if send_frame(&out_tx, &event).is_err() { break; } }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            event = orchestrator_rx.recv() => {
                match event {
                    Ok(event) => { if !forward_orchestrator_event(event, &session, &out_tx) { break; } }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    on_disconnect(&mut session, &state).await;
    writer.abort();
    tracing::debug!(conn_id = %session.conn_id, "connection closed");
}

fn send_frame(out_tx: &mpsc::Sender<Message>, event: &ServerEvent) -> Result<(), ()> {
    let text = serde_json::to_string(event).expect("ServerEvent always serializes");
    out_tx.try_send(Message::Text(text.into())).map_err(|_| ())
}

fn send_ack(out_tx: &mpsc::Sender<Message>, ack_id: u64, result: AckResult) {
    let frame = AckFrame { ack_id, result };
    let text = serde_json::to_string(&frame).expect("AckFrame always serializes");
    let _ = out_tx.try_send(Message::Text(text.into()));
}

/// Only `new-producer`/`producer-closed` travel this path; both carry
/// `except_conn` and are relevant only to connections currently joined to
/// the same voice channel.
fn forward_orchestrator_event(event: OrchestratorEvent, session: &Session, out_tx: &mpsc::Sender<Message>) -> bool {
    let (channel_id, except_conn, server_event) = match event {
        OrchestratorEvent::NewProducer { channel_id, except_conn, producer_id, user_id } => {
            (channel_id, except_conn, ServerEvent::NewProducer { producer_id, user_id })
        }
        OrchestratorEvent::ProducerClosed { channel_id, except_conn, producer_id } => {
            (channel_id, except_conn, ServerEvent::ProducerClosed { producer_id })
        }
    };

    if session.channel_id != Some(channel_id) || session.conn_id == except_conn {
        return true;
    }
    send_frame(out_tx, &server_event).is_ok()
}

/// Returns `false` when the connection should be closed (parse failure,
/// or the client's outbound queue is backed up past the high-water mark).
async fn dispatch_frame(text: &str, session: &mut Session, state: &Arc<GatewayState>, out_tx: &mpsc::Sender<Message>) -> bool {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(conn_id = %session.conn_id, error = %e, "malformed client frame, dropping");
            return true;
        }
    };

    match frame.event {
        ClientEvent::UserOnline { user } => {
            session.mark_present(user.clone());
            let snapshot = state.presence.mark_online(session.conn_id, user).await;
            let _ = state.events_tx.send(ServerEvent::UsersUpdate { users: snapshot });

            for (channel_id, users) in state.membership.snapshot_all().await {
                if send_frame(out_tx, &ServerEvent::VoiceChannelUsersUpdate { channel_id, users }).is_err() {
                    return false;
                }
            }
            true
        }

        ClientEvent::SendMessage { server_id, channel_id, content, user } => {
            let request = SendMessageRequest { server_id, channel_id, content, user };
            if let Err(e) = request.validate() {
                tracing::warn!(conn_id = %session.conn_id, error = %e, "send_message failed validation");
                return true;
            }

            match state.store.append_message(request.server_id, request.channel_id, &request.content, request.user).await {
                Ok(message) => {
                    let _ = state
                        .events_tx
                        .send(ServerEvent::NewMessage { server_id: request.server_id, channel_id: request.channel_id, message });
                }
                Err(e) => tracing::warn!(conn_id = %session.conn_id, error = %e, "send_message failed"),
            }
            true
        }

        ClientEvent::JoinVoiceChannel { channel_id, user_id } => {
            if let Err(reason) = session.try_join(channel_id) {
                tracing::warn!(conn_id = %session.conn_id, reason, "rejected join_voice_channel");
                return true;
            }

            match state.orchestrator.join(session.conn_id, channel_id, user_id).await {
                Ok(join_result) => {
                    session.mark_joined(channel_id);
                    if send_frame(out_tx, &ServerEvent::RouterRtpCapabilities { rtp_capabilities: join_result.rtp_capabilities }).is_err() {
                        return false;
                    }
                    if send_frame(out_tx, &ServerEvent::ExistingProducers { producers: join_result.existing_producers }).is_err() {
                        return false;
                    }

                    state.membership.insert(channel_id, session.conn_id, user_ref_for(session)).await;
                    for (channel_id, users) in state.membership.snapshot_broadcast().await {
                        let _ = state.events_tx.send(ServerEvent::VoiceChannelUsersUpdate { channel_id, users });
                    }
                }
                Err(e) => tracing::warn!(conn_id = %session.conn_id, error = %e, "join_voice_channel failed"),
            }
            true
        }

        ClientEvent::LeaveVoiceChannel { channel_id } => {
            leave_voice(session, state, channel_id).await;
            true
        }

        ClientEvent::CreateTransport { channel_id, direction } => {
            let Some(ack_id) = frame.ack_id else {
                tracing::warn!(conn_id = %session.conn_id, event = "create-transport", "missing ack_id, dropping frame");
                return true;
            };
            if let Err(reason) = session.require_channel(channel_id) {
                send_ack(out_tx, ack_id, AckResult::err(reason));
                return true;
            }

            let result = tokio::time::timeout(ACK_TIMEOUT, state.orchestrator.create_transport(session.conn_id, channel_id, direction)).await;
            match result {
                Ok(Ok(params)) => send_ack(out_tx, ack_id, AckResult::ok(params)),
                Ok(Err(e)) => send_ack(out_tx, ack_id, AckResult::err(e.kind())),
                Err(_) => send_ack(out_tx, ack_id, AckResult::err("internal")),
            }
            true
        }

        ClientEvent::ConnectTransport { channel_id, transport_id, dtls_parameters } => {
            let Some(ack_id) = frame.ack_id else {
                tracing::warn!(conn_id = %session.conn_id, event = "connect-transport", "missing ack_id, dropping frame");
                return true;
            };
            if let Err(reason) = session.require_channel(channel_id) {
                send_ack(out_tx, ack_id, AckResult::err(reason));
                return true;
            }

            let result =
                tokio::time::timeout(ACK_TIMEOUT, state.orchestrator.connect_transport(session.conn_id, channel_id, transport_id, dtls_parameters)).await;
            match result {
                Ok(Ok(())) => send_ack(out_tx, ack_id, AckResult::ok(serde_json::json!({}))),
                Ok(Err(e)) => send_ack(out_tx, ack_id, AckResult::err(e.kind())),
                Err(_) => send_ack(out_tx, ack_id, AckResult::err("internal")),
            }
            true
        }

        ClientEvent::Produce { channel_id, transport_id, kind, rtp_parameters } => {
            let Some(ack_id) = frame.ack_id else {
                tracing::warn!(conn_id = %session.conn_id, event = "produce", "missing ack_id, dropping frame");
                return true;
            };
            if let Err(reason) = session.require_channel(channel_id) {
                send_ack(out_tx, ack_id, AckResult::err(reason));
                return true;
            }
            if let Err(reason) = session.require_not_producing() {
                send_ack(out_tx, ack_id, AckResult::err(reason));
                return true;
            }

            let result =
                tokio::time::timeout(ACK_TIMEOUT, state.orchestrator.produce(session.conn_id, channel_id, transport_id, kind, rtp_parameters)).await;
            match result {
                Ok(Ok(producer_id)) => {
                    session.mark_producing();
                    send_ack(out_tx, ack_id, AckResult::ok(serde_json::json!({ "producer_id": producer_id })));
                }
                Ok(Err(e)) => send_ack(out_tx, ack_id, AckResult::err(e.kind())),
                Err(_) => send_ack(out_tx, ack_id, AckResult::err("internal")),
            }
            true
        }

        ClientEvent::Consume { channel_id, producer_id, rtp_capabilities, transport_id } => {
            let Some(ack_id) = frame.ack_id else {
                tracing::warn!(conn_id = %session.conn_id, event = "consume", "missing ack_id, dropping frame");
                return true;
            };
            if let Err(reason) = session.require_channel(channel_id) {
                send_ack(out_tx, ack_id, AckResult::err(reason));
                return true;
            }

            let result = tokio::time::timeout(
                ACK_TIMEOUT,
                state.orchestrator.consume(session.conn_id, channel_id, producer_id, rtp_capabilities, transport_id),
            )
            .await;
            match result {
                Ok(Ok(consume_result)) => send_ack(out_tx, ack_id, AckResult::ok(consume_result)),
                Ok(Err(e)) => send_ack(out_tx, ack_id, AckResult::err(e.kind())),
                Err(_) => send_ack(out_tx, ack_id, AckResult::err("internal")),
            }
            true
        }

        ClientEvent::UserSpeaking { channel_id, speaking } => {
            if session.channel_id == Some(channel_id) {
                let _ = state.events_tx.send(ServerEvent::UserSpeakingUpdate { conn_id: session.conn_id, speaking });
            }
            true
        }
    }
}

fn user_ref_for(session: &Session) -> UserRef {
    session.user.clone().expect("joined sessions always have an identified user")
}

async fn leave_voice(session: &mut Session, state: &Arc<GatewayState>, channel_id: Uuid) {
    if session.channel_id != Some(channel_id) {
        return;
    }
    state.orchestrator.leave(session.conn_id, channel_id).await;
    session.mark_left_voice();

    if let Some(snapshot) = state.membership.remove(channel_id, session.conn_id).await {
        // Broadcast the mutated channel directly first — if it just
        // emptied, it no longer appears in `snapshot_broadcast`'s
        // non-empty listing, so its watchers still need this explicit
        // empty roster to clear their view.
        let _ = state.events_tx.send(ServerEvent::VoiceChannelUsersUpdate { channel_id, users: snapshot });
        for (channel_id, users) in state.membership.snapshot_broadcast().await {
            let _ = state.events_tx.send(ServerEvent::VoiceChannelUsersUpdate { channel_id, users });
        }
    }
}

/// Disconnect is leave-from-voice (if any) plus presence removal plus a
/// membership rebroadcast, all idempotent against a connection that never
/// got past `Uninitialized` (`spec.md` §4.5).
async fn on_disconnect(session: &mut Session, state: &Arc<GatewayState>) {
    if let Some(channel_id) = session.channel_id {
        leave_voice(session, state, channel_id).await;
    }

    if let Some(snapshot) = state.presence.mark_offline(session.conn_id).await {
        let _ = state.events_tx.send(ServerEvent::UsersUpdate { users: snapshot });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use vane_common::config::AppConfig;
    use vane_voice::TransportDirection;

    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            port: 0,
            frontend_url: String::new(),
            rtc_min_port: 41000,
            rtc_max_port: 42000,
            announced_ip: "127.0.0.1".to_string(),
            store_path: String::new(),
        }
    }

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir().join(format!("vane-gateway-test-{}.json", Uuid::new_v4()))
    }

    async fn test_state() -> Arc<GatewayState> {
        let store = Store::open(temp_store_path()).await;
        let orchestrator = Orchestrator::new(&test_config()).await.expect("orchestrator starts");
        Arc::new(GatewayState::new(store, orchestrator))
    }

    fn user(name: &str) -> UserRef {
        UserRef { id: Uuid::new_v4(), username: name.to_string(), avatar_url: None }
    }

    async fn recv_json(rx: &mut mpsc::Receiver<Message>, expected: usize) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        for _ in 0..expected {
            let msg = rx.recv().await.expect("message expected");
            let Message::Text(text) = msg else { panic!("expected a text frame") };
            out.push(serde_json::from_str(&text).expect("valid json"));
        }
        out
    }

    /// A fresh `user_online` must catch the connection up on every
    /// currently non-empty voice channel, not just whichever one was most
    /// recently mutated.
    #[tokio::test(flavor = "multi_thread")]
    async fn user_online_catches_up_on_every_non_empty_voice_channel() {
        let state = test_state().await;
        let channel_a = Uuid::new_v4();
        let channel_b = Uuid::new_v4();
        state.membership.insert(channel_a, Uuid::new_v4(), user("ada")).await;
        state.membership.insert(channel_b, Uuid::new_v4(), user("grace")).await;

        let mut session = Session::new(Uuid::new_v4());
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let frame = serde_json::json!({ "event": "user_online", "data": { "user": user("lovelace") } }).to_string();

        assert!(dispatch_frame(&frame, &mut session, &state, &out_tx).await);

        let events = recv_json(&mut out_rx, 3).await;
        assert_eq!(events[0]["event"], "users_update");

        let seen: HashSet<String> = events[1..]
            .iter()
            .map(|e| {
                assert_eq!(e["event"], "voice_channel_users_update");
                e["data"]["channel_id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(seen, [channel_a.to_string(), channel_b.to_string()].into_iter().collect());
    }

    /// A `create-transport` frame with no `ack_id` is dropped with a log,
    /// not silently ignored and not killing the connection.
    #[tokio::test(flavor = "multi_thread")]
    async fn a_request_reply_frame_without_an_ack_id_does_not_close_the_connection() {
        let state = test_state().await;
        let mut session = Session::new(Uuid::new_v4());
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let frame = serde_json::json!({ "event": "create-transport", "data": { "channel_id": Uuid::new_v4(), "direction": "send" } }).to_string();

        assert!(dispatch_frame(&frame, &mut session, &state, &out_tx).await);
        assert!(out_rx.try_recv().is_err(), "no ack should be sent for a frame missing ack_id");
    }

    /// Disconnecting while joined to a voice channel tears the room down
    /// and leaves the orchestrator holding nothing for that connection.
    #[tokio::test(flavor = "multi_thread")]
    async fn disconnecting_while_joined_to_voice_leaves_no_trace() {
        let state = test_state().await;
        let channel = Uuid::new_v4();
        let mut session = Session::new(Uuid::new_v4());
        session.mark_present(user("ada"));
        state.presence.mark_online(session.conn_id, user("ada")).await;

        state.orchestrator.join(session.conn_id, channel, Uuid::new_v4()).await.expect("join");
        state.membership.insert(channel, session.conn_id, user("ada")).await;
        session.mark_joined(channel);

        on_disconnect(&mut session, &state).await;

        assert!(state.membership.snapshot_all().await.is_empty());
        let err = state
            .orchestrator
            .create_transport(session.conn_id, channel, TransportDirection::Recv)
            .await
            .expect_err("room was torn down on disconnect");
        assert_eq!(err.kind(), "not-found");
    }

    /// Disconnecting a connection that joined voice alongside another
    /// still-present participant only removes the disconnecting one.
    #[tokio::test(flavor = "multi_thread")]
    async fn disconnecting_one_of_two_voice_participants_keeps_the_room_for_the_other() {
        let state = test_state().await;
        let channel = Uuid::new_v4();

        let mut leaver = Session::new(Uuid::new_v4());
        state.orchestrator.join(leaver.conn_id, channel, Uuid::new_v4()).await.expect("leaver joins");
        state.membership.insert(channel, leaver.conn_id, user("ada")).await;
        leaver.mark_joined(channel);

        let stayer = Uuid::new_v4();
        state.orchestrator.join(stayer, channel, Uuid::new_v4()).await.expect("stayer joins");
        state.membership.insert(channel, stayer, user("grace")).await;

        on_disconnect(&mut leaver, &state).await;

        let room = state.orchestrator.create_transport(stayer, channel, TransportDirection::Recv).await;
        assert!(room.is_ok(), "room must still exist for the remaining participant");
    }
}
