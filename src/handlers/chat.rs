use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::error::AppError;
use crate::security::AuthenticatedUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    /// Absent or `0` requests a new session; otherwise an existing `sid`.
    pub session_id: Option<String>,
    pub message: String,
    pub mode: String,
    pub file_id: Option<i64>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub assistant_persisted: bool,
}

/// `POST /chat` (§6). Rate limited 10/min per authenticated subject.
pub async fn chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    state.rate_limit_chat.check(&user.claims.sub)?;

    if req.message.trim().is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }

    let sid = req.session_id.filter(|s| !s.is_empty() && s != "0");

    let outcome = state
        .chat_service
        .handle_message(sid, &user.claims.sub, &req.message, &req.mode, req.file_id)
        .await?;

    Ok(Json(ChatResponse {
        session_id: outcome.sid,
        reply: outcome.reply,
        assistant_persisted: outcome.assistant_persisted,
    }))
}

#[derive(Serialize)]
pub struct DeleteSessionResponse {
    pub deleted: bool,
}

/// `DELETE /sessions/{sid}` (§6).
pub async fn delete_session(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(sid): Path<String>,
) -> Result<Json<DeleteSessionResponse>, AppError> {
    let deleted = state.repository.delete_session(&sid).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("session {sid}")));
    }

    state.chat_service.evict_session(&sid);

    Ok(Json(DeleteSessionResponse { deleted: true }))
}
