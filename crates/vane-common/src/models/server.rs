//! Server model — the community container.
//!
//! A server owns an ordered list of channels and is never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::channel::Channel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: Uuid,
    pub name: String,
    pub channels: Vec<Channel>,
    pub created_at: DateTime<Utc>,
}

/// `POST /api/servers` request body.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateServerRequest {
    #[validate(length(min = 1, max = 100, message = "server name must be 1-100 characters"))]
    pub name: String,
}
