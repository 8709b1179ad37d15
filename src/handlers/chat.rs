use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::services::conversation;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|kv| {
        let (key, value) = kv.trim().split_once('=')?;
        (key == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let (session_id, minted) = match session_id_from_headers(&headers) {
        Some(id) => (id, false),
        None => (uuid::Uuid::new_v4().to_string(), true),
    };

    let message = req.message.trim();
    tracing::info!(session = %session_id, "incoming chat message");

    // A mid-conversation failure answers like the assistant, not like an API.
    let reply = match conversation::process_message(&state, &session_id, message).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, session = %session_id, "conversation processing failed");
            conversation::FALLBACK_REPLY.to_string()
        }
    };

    // Opportunistic cleanup of expired sessions.
    {
        let db = state.db.lock().unwrap();
        if let Err(e) = queries::expire_old_sessions(&db) {
            tracing::warn!(error = %e, "failed to expire old sessions");
        }
    }

    let mut response = Json(ChatResponse { response: reply }).into_response();
    if minted {
        let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(session_id) = session_id_from_headers(&headers) {
        let db = state.db.lock().unwrap();
        queries::delete_session(&db, &session_id)?;
        tracing::info!(session = %session_id, "session cleared");
    }
    Ok("Session cleared.".into_response())
}
