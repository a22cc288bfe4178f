//! Message model — a single text channel append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::user::UserRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub user_ref: UserRef,
    pub timestamp: DateTime<Utc>,
}

/// `send_message` gateway event payload / internal append request.
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub server_id: Uuid,
    pub channel_id: Uuid,
    #[validate(length(min = 1, max = 4000, message = "message must be 1-4000 characters"))]
    pub content: String,
    pub user: UserRef,
}
