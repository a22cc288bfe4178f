//! Login — identity is trusted as supplied, so this is resolve-or-create
//! by username, never a credential check (`spec.md` §1 Non-goals).

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use validator::Validate;
use vane_common::error::VaneResult;
use vane_common::models::{LoginRequest, User};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/auth/login", post(login))
}

#[derive(Serialize)]
struct LoginResponse {
    user: User,
}

/// POST /api/auth/login — resolves `{username}` to the same `User.id` on
/// every call (R3).
async fn login(State(state): State<Arc<AppState>>, Json(body): Json<LoginRequest>) -> VaneResult<Json<LoginResponse>> {
    body.validate().map_err(|e| vane_common::error::VaneError::BadRequest(e.to_string()))?;

    let user = state.store.resolve_or_create_user(&body.username).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(LoginResponse { user }))
}
