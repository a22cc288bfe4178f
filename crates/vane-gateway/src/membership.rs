//! Per-voice-channel ordered membership index (`spec.md` §4.3). Backed by
//! `IndexMap` so snapshots are in join order, which is the only ordering
//! clients can observe. A channel entry is removed the instant it empties
//! — callers must broadcast the resulting empty snapshot themselves
//! before it disappears from [`Self::snapshot_all`].

use std::collections::HashMap;

use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use vane_common::models::UserRef;

#[derive(Default)]
pub struct MembershipIndex {
    channels: RwLock<HashMap<Uuid, IndexMap<Uuid, UserRef>>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn_id` to `channel_id`'s membership, returning that
    /// channel's new snapshot.
    pub async fn insert(&self, channel_id: Uuid, conn_id: Uuid, user: UserRef) -> Vec<UserRef> {
        let mut channels = self.channels.write().await;
        let channel = channels.entry(channel_id).or_default();
        channel.insert(conn_id, user);
        channel.values().cloned().collect()
    }

    /// Removes `conn_id` from `channel_id`. Returns `Some(snapshot)` — the
    /// empty vec if the channel just became empty and was dropped — or
    /// `None` if `conn_id` was not a member (idempotent leave, R2).
    pub async fn remove(&self, channel_id: Uuid, conn_id: Uuid) -> Option<Vec<UserRef>> {
        let mut channels = self.channels.write().await;
        let channel = channels.get_mut(&channel_id)?;
        channel.shift_remove(&conn_id)?;

        if channel.is_empty() {
            channels.remove(&channel_id);
            Some(Vec::new())
        } else {
            Some(channel.values().cloned().collect())
        }
    }

    /// Snapshot of every currently non-empty channel, for catch-up on a
    /// fresh `user_online`.
    pub async fn snapshot_all(&self) -> Vec<(Uuid, Vec<UserRef>)> {
        self.channels.read().await.iter().map(|(id, members)| (*id, members.values().cloned().collect())).collect()
    }

    /// Same snapshot as [`Self::snapshot_all`], named for its other call
    /// site: `spec.md` §4.3 requires every `insert`/`remove` to be
    /// followed by a broadcast of every non-empty channel, not just the
    /// one that changed, so channels no one just mutated still reach
    /// clients watching them.
    pub async fn snapshot_broadcast(&self) -> Vec<(Uuid, Vec<UserRef>)> {
        self.snapshot_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRef {
        UserRef { id: Uuid::new_v4(), username: "ada".to_string(), avatar_url: None }
    }

    #[tokio::test]
    async fn channel_disappears_once_empty() {
        let index = MembershipIndex::new();
        let channel = Uuid::new_v4();
        let conn = Uuid::new_v4();

        index.insert(channel, conn, user()).await;
        assert_eq!(index.snapshot_all().await.len(), 1);

        let snapshot = index.remove(channel, conn).await.unwrap();
        assert!(snapshot.is_empty());
        assert!(index.snapshot_all().await.is_empty());
    }

    #[tokio::test]
    async fn double_remove_is_a_no_op() {
        let index = MembershipIndex::new();
        let channel = Uuid::new_v4();
        let conn = Uuid::new_v4();

        index.insert(channel, conn, user()).await;
        assert!(index.remove(channel, conn).await.is_some());
        assert!(index.remove(channel, conn).await.is_none());
    }
}
