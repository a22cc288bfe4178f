//! User model — the identity layer.
//!
//! Identity is trusted as supplied: there is no password, no email, no
//! session token. A user is created the first time a username is seen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A Vane user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID (UUID v7 — time-sortable).
    pub id: Uuid,
    /// Unique username.
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A small, denormalized view of a [`User`] embedded in messages and
/// presence/membership snapshots, so peers never need to re-fetch a user
/// by id just to render a name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for UserRef {
    fn from(u: &User) -> Self {
        Self { id: u.id, username: u.username.clone(), avatar_url: u.avatar_url.clone() }
    }
}

/// `POST /api/auth/login` request body — resolve-or-create by username.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
}
