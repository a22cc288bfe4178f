//! Single-file JSON document store.
//!
//! The whole persisted state is one JSON document, `{users, servers[]}`
//! (each `Server` nests its `channels[]`, each text `Channel` nests its
//! `messages[]`). Reads and writes are whole-file: there is no schema
//! migration and no partial update. Locking follows the shape of
//! `InMemoryStore` in the control-plane reference this crate is grounded
//! on — mutate the in-memory document under a short-lived lock, then
//! persist the result to disk without holding that lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vane_common::error::{VaneError, VaneResult};
use vane_common::ids::generate_id;
use vane_common::models::{Channel, ChannelType, Message, Server, User, UserRef};

/// The root document. Missing or corrupt files on disk are treated as an
/// empty default, per the spec's read-failure policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Doc {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub servers: Vec<Server>,
}

/// Document store adapter: owns the in-memory document plus its on-disk
/// path, and the handful of repository-style operations the rest of the
/// system needs (identity resolution, server/channel creation, message
/// append).
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<Doc>>,
    path: PathBuf,
}

impl Store {
    /// Load the document from `path`, or start from an empty default if
    /// the file is missing or fails to parse.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Doc>(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "store file corrupt, starting from empty default");
                Doc::default()
            }),
            Err(e) => {
                tracing::info!(path = %path.display(), error = %e, "store file unreadable, starting from empty default");
                Doc::default()
            }
        };
        Self { inner: Arc::new(RwLock::new(doc)), path }
    }

    fn with_read<R>(&self, f: impl FnOnce(&Doc) -> R) -> R {
        let g = self.inner.read();
        f(&g)
    }

    fn with_write<R>(&self, f: impl FnOnce(&mut Doc) -> R) -> R {
        let mut g = self.inner.write();
        f(&mut g)
    }

    /// Raw whole-document read, exposed for callers that need a full
    /// snapshot (e.g. gateway catch-up).
    pub fn read(&self) -> Doc {
        self.with_read(Clone::clone)
    }

    /// Raw whole-document write: atomic, via write-to-temp-then-rename in
    /// the document's own directory so the rename is same-filesystem.
    async fn persist(&self, doc: &Doc) -> VaneResult<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| VaneError::Internal(e.into()))?;

        let bytes = serde_json::to_vec_pretty(doc).map_err(|e| VaneError::Internal(e.into()))?;
        let target = self.path.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            use std::io::Write;
            tmp.write_all(&bytes)?;
            tmp.flush()?;
            tmp.persist(&target)?;
            Ok(())
        })
        .await
        .map_err(|e| VaneError::Internal(e.into()))?
        .map_err(VaneError::Internal)
    }

    /// Resolve a user by username, creating one if it does not exist yet.
    /// Idempotent: the same username always resolves to the same `User.id`.
    pub async fn resolve_or_create_user(&self, username: &str) -> VaneResult<User> {
        let (user, doc_snapshot) = self.with_write(|doc| {
            if let Some(existing) = doc.users.iter().find(|u| u.username == username) {
                return (existing.clone(), None);
            }
            let user = User {
                id: generate_id(),
                username: username.to_string(),
                avatar_url: None,
                created_at: Utc::now(),
            };
            doc.users.push(user.clone());
            (user, Some(doc.clone()))
        });

        if let Some(snapshot) = doc_snapshot {
            self.persist(&snapshot).await?;
        }
        Ok(user)
    }

    pub fn list_servers(&self) -> Vec<Server> {
        self.with_read(|doc| doc.servers.clone())
    }

    /// Creates a server with one default text channel named `general`.
    pub async fn create_server(&self, name: &str) -> VaneResult<Server> {
        let now = Utc::now();
        let default_channel = Channel {
            id: generate_id(),
            name: "general".to_string(),
            kind: ChannelType::Text,
            messages: Vec::new(),
            created_at: now,
        };
        let server =
            Server { id: generate_id(), name: name.to_string(), channels: vec![default_channel], created_at: now };

        let snapshot = self.with_write(|doc| {
            doc.servers.push(server.clone());
            doc.clone()
        });
        self.persist(&snapshot).await?;
        Ok(server)
    }

    /// Appends a channel to an existing server. `kind` defaults to `Text`
    /// at the call site (the REST layer decides the default).
    pub async fn create_channel(&self, server_id: Uuid, name: &str, kind: ChannelType) -> VaneResult<Channel> {
        let channel = Channel { id: generate_id(), name: name.to_string(), kind, messages: Vec::new(), created_at: Utc::now() };

        let snapshot = self.with_write(|doc| -> VaneResult<Doc> {
            let server = doc
                .servers
                .iter_mut()
                .find(|s| s.id == server_id)
                .ok_or_else(|| VaneError::NotFound { resource: "server".to_string() })?;
            server.channels.push(channel.clone());
            Ok(doc.clone())
        })?;
        self.persist(&snapshot).await?;
        Ok(channel)
    }

    /// Returns the messages of a text channel, `not-found` if the server
    /// or channel does not exist.
    pub fn get_messages(&self, server_id: Uuid, channel_id: Uuid) -> VaneResult<Vec<Message>> {
        self.with_read(|doc| {
            let server = doc
                .servers
                .iter()
                .find(|s| s.id == server_id)
                .ok_or_else(|| VaneError::NotFound { resource: "server".to_string() })?;
            let channel = server
                .channels
                .iter()
                .find(|c| c.id == channel_id)
                .ok_or_else(|| VaneError::NotFound { resource: "channel".to_string() })?;
            Ok(channel.messages.clone())
        })
    }

    /// Appends a message to a text channel. The in-memory mutation happens
    /// under the document lock, giving per-channel appends (I7) a total
    /// order without a separate queue; the persist to disk happens after
    /// the lock is released.
    pub async fn append_message(&self, server_id: Uuid, channel_id: Uuid, content: &str, user: UserRef) -> VaneResult<Message> {
        let message = Message { id: generate_id(), content: content.to_string(), user_ref: user, timestamp: Utc::now() };

        let snapshot = self.with_write(|doc| -> VaneResult<Doc> {
            let server = doc
                .servers
                .iter_mut()
                .find(|s| s.id == server_id)
                .ok_or_else(|| VaneError::NotFound { resource: "server".to_string() })?;
            let channel = server
                .channels
                .iter_mut()
                .find(|c| c.id == channel_id)
                .ok_or_else(|| VaneError::NotFound { resource: "channel".to_string() })?;
            channel.messages.push(message.clone());
            Ok(doc.clone())
        })?;
        self.persist(&snapshot).await?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path().join("vane.json")).await
    }

    #[tokio::test]
    async fn missing_file_yields_empty_default() {
        let store = temp_store().await;
        let doc = store.read();
        assert!(doc.users.is_empty());
        assert!(doc.servers.is_empty());
    }

    #[tokio::test]
    async fn resolve_or_create_user_is_idempotent() {
        let store = temp_store().await;
        let a = store.resolve_or_create_user("ada").await.unwrap();
        let b = store.resolve_or_create_user("ada").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.read().users.len(), 1);
    }

    #[tokio::test]
    async fn create_server_adds_default_general_channel() {
        let store = temp_store().await;
        let server = store.create_server("test server").await.unwrap();
        assert_eq!(server.channels.len(), 1);
        assert_eq!(server.channels[0].name, "general");
        assert_eq!(server.channels[0].kind, ChannelType::Text);
    }

    #[tokio::test]
    async fn append_message_orders_appends_per_channel() {
        let store = temp_store().await;
        let server = store.create_server("s").await.unwrap();
        let channel_id = server.channels[0].id;
        let user = UserRef { id: generate_id(), username: "ada".into(), avatar_url: None };

        store.append_message(server.id, channel_id, "first", user.clone()).await.unwrap();
        store.append_message(server.id, channel_id, "second", user).await.unwrap();

        let messages = store.get_messages(server.id, channel_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }

    #[tokio::test]
    async fn get_messages_not_found_for_unknown_channel() {
        let store = temp_store().await;
        let server = store.create_server("s").await.unwrap();
        let err = store.get_messages(server.id, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn reopening_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vane.json");

        let store = Store::open(&path).await;
        store.resolve_or_create_user("ada").await.unwrap();
        store.create_server("s").await.unwrap();

        let reopened = Store::open(&path).await;
        let doc = reopened.read();
        assert_eq!(doc.users.len(), 1);
        assert_eq!(doc.servers.len(), 1);
    }
}
