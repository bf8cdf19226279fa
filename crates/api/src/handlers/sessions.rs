//! Handlers for the caller's own sessions.

use axum::extract::{Path, State};
use chrono::Utc;
use crowdship_core::error::CoreError;
use crowdship_core::types::{SessionId, Timestamp};
use crowdship_db::models::session::UserSession;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::{ApiResponse, MessageResponse};
use crate::state::AppState;

/// One session as shown to its owner. The token hash is never exposed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_name: Option<String>,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub expires_at: Timestamp,
    /// The session the request's access token was issued under.
    pub current: bool,
}

impl SessionView {
    fn new(session: UserSession, current: SessionId) -> Self {
        Self {
            current: session.id == current,
            id: session.id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            device_name: session.device_name,
            created_at: session.created_at,
            last_accessed_at: session.last_accessed_at,
            expires_at: session.expires_at,
        }
    }
}

/// GET /api/auth/sessions
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<ApiResponse<Vec<SessionView>>> {
    let now = Utc::now();
    let sessions = state
        .stores
        .sessions
        .list_active_for_user(user.user_id)
        .await?
        .into_iter()
        .filter(|s| s.is_valid_at(now))
        .map(|s| SessionView::new(s, user.session_id))
        .collect();

    Ok(ApiResponse::ok(sessions))
}

/// DELETE /api/auth/sessions/{id}
///
/// Another user's session is reported as not found.
pub async fn revoke(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<SessionId>,
) -> AppResult<ApiResponse<MessageResponse>> {
    if !state.tokens.revoke_session(user.user_id, session_id).await? {
        return Err(CoreError::NotFound {
            entity: "Session",
            id: session_id.to_string(),
        }
        .into());
    }

    tracing::info!(user_id = user.user_id, %session_id, "Session revoked by owner");
    Ok(ApiResponse::ok(MessageResponse {
        message: "Session revoked",
    }))
}
