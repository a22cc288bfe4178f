//! The per-connection session state machine (`spec.md` §4.2): tracks
//! enough state, local to the connection task that owns it, to reject
//! invalid transitions before they ever reach the orchestrator.
//!
//! ```text
//! Uninitialized ── user_online ──▶ Present
//! Present ── join_voice_channel(ok) ──▶ Joined(channel)
//! Joined ── produce(ok) ──▶ Producing
//! Producing ── produce-close / leave ──▶ Joined
//! Joined ── leave_voice_channel / disconnect ──▶ Present
//! any ── disconnect ──▶ Terminal
//! ```

use uuid::Uuid;
use vane_common::models::UserRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Present,
    Joined,
    Producing,
}

pub struct Session {
    pub conn_id: Uuid,
    pub user: Option<UserRef>,
    pub state: SessionState,
    pub channel_id: Option<Uuid>,
}

impl Session {
    pub fn new(conn_id: Uuid) -> Self {
        Self { conn_id, user: None, state: SessionState::Uninitialized, channel_id: None }
    }

    pub fn mark_present(&mut self, user: UserRef) {
        self.user = Some(user);
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Present;
        }
    }

    /// `None` if the transition is legal — rejoining a channel already
    /// joined is idempotent; joining a different one without an explicit
    /// leave first is rejected (I1).
    pub fn try_join(&self, channel_id: Uuid) -> Result<(), &'static str> {
        match self.channel_id {
            Some(current) if current != channel_id => Err("already joined to a different channel"),
            _ => Ok(()),
        }
    }

    pub fn mark_joined(&mut self, channel_id: Uuid) {
        self.state = SessionState::Joined;
        self.channel_id = Some(channel_id);
    }

    /// Validates that a transport/produce/consume event names the
    /// channel this connection actually joined.
    pub fn require_channel(&self, channel_id: Uuid) -> Result<(), &'static str> {
        match self.channel_id {
            Some(current) if current == channel_id => Ok(()),
            _ => Err("not joined to this channel"),
        }
    }

    pub fn require_not_producing(&self) -> Result<(), &'static str> {
        if self.state == SessionState::Producing {
            Err("already producing")
        } else {
            Ok(())
        }
    }

    pub fn mark_producing(&mut self) {
        if self.channel_id.is_some() {
            self.state = SessionState::Producing;
        }
    }

    /// Clears voice-channel membership, returning to `Present` (or
    /// `Uninitialized` if never identified) — used by both explicit leave
    /// and disconnect-from-voice.
    pub fn mark_left_voice(&mut self) {
        self.channel_id = None;
        self.state = if self.user.is_some() { SessionState::Present } else { SessionState::Uninitialized };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRef {
        UserRef { id: Uuid::new_v4(), username: "ada".to_string(), avatar_url: None }
    }

    #[test]
    fn rejoining_same_channel_is_fine() {
        let mut session = Session::new(Uuid::new_v4());
        session.mark_present(user());
        let channel = Uuid::new_v4();
        session.mark_joined(channel);
        assert!(session.try_join(channel).is_ok());
    }

    #[test]
    fn joining_a_second_channel_without_leaving_is_rejected() {
        let mut session = Session::new(Uuid::new_v4());
        session.mark_present(user());
        session.mark_joined(Uuid::new_v4());
        assert!(session.try_join(Uuid::new_v4()).is_err());
    }

    #[test]
    fn leaving_voice_returns_to_present() {
        let mut session = Session::new(Uuid::new_v4());
        session.mark_present(user());
        session.mark_joined(Uuid::new_v4());
        session.mark_producing();
        assert_eq!(session.state, SessionState::Producing);

        session.mark_left_voice();
        assert_eq!(session.state, SessionState::Present);
        assert!(session.channel_id.is_none());
    }
}
