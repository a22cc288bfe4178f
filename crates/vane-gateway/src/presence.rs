//! In-memory connection ↔ user mapping (`spec.md` §2.3). Every add/remove
//! is followed by a `users_update` snapshot broadcast of everyone
//! currently online.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;
use vane_common::models::UserRef;

#[derive(Default)]
pub struct PresenceRegistry {
    online: RwLock<HashMap<Uuid, UserRef>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `conn_id` as online as `user`, returning the new snapshot
    /// of every online user for the caller to broadcast.
    pub async fn mark_online(&self, conn_id: Uuid, user: UserRef) -> Vec<UserRef> {
        let mut online = self.online.write().await;
        online.insert(conn_id, user);
        online.values().cloned().collect()
    }

    /// Removes `conn_id`, returning `Some(snapshot)` if it had been
    /// recorded online, or `None` if this is a redundant remove (keeps
    /// disconnect idempotent per §4.5).
    pub async fn mark_offline(&self, conn_id: Uuid) -> Option<Vec<UserRef>> {
        let mut online = self.online.write().await;
        online.remove(&conn_id)?;
        Some(online.values().cloned().collect())
    }

    pub async fn snapshot(&self) -> Vec<UserRef> {
        self.online.read().await.values().cloned().collect()
    }
}
