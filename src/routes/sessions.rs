//! Session lifecycle routes.
//!
//! Every route requires the acting user to be a participant; the service
//! layer enforces it and these handlers only translate.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::error::EconomyError;
use crate::services::session::{self, SaveState, SessionEnd, SessionView};
use crate::services::timer::Timer;
use crate::state::{AppState, ChatMessage, Session, now_ms};

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    pub partner_id: Uuid,
}

/// `POST /api/sessions`: create, or reuse the pair's active session.
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateSession>,
) -> Result<(StatusCode, Json<Session>), EconomyError> {
    let (session, created) = session::create_session(&state, auth.user.id, body.partner_id, now_ms()).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(session)))
}

/// `GET /api/sessions/{id}`
pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, EconomyError> {
    Ok(Json(session::get_session(&state, session_id, auth.user.id).await?))
}

/// `GET /api/sessions/{id}/chat`
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, EconomyError> {
    Ok(Json(session::chat_history(&state, session_id, auth.user.id).await?))
}

/// `POST /api/sessions/{id}/timer/start`: the caller starts teaching.
pub async fn start_timer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Timer>, EconomyError> {
    Ok(Json(session::start_timer(&state, session_id, auth.user.id, now_ms()).await?))
}

/// `POST /api/sessions/{id}/timer/stop`
pub async fn stop_timer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Timer>, EconomyError> {
    Ok(Json(session::stop_timer(&state, session_id, auth.user.id, now_ms()).await?))
}

/// `POST /api/sessions/{id}/end`: settle and notify the room.
pub async fn end(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionEnd>, EconomyError> {
    Ok(Json(session::end_session(&state, session_id, auth.user.id, now_ms()).await?))
}

/// `POST /api/sessions/{id}/state`
pub async fn save_state(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
    Json(fields): Json<SaveState>,
) -> Result<Json<Session>, EconomyError> {
    Ok(Json(session::save_state(&state, session_id, auth.user.id, fields).await?))
}

#[cfg(test)]
#[path = "sessions_test.rs"]
mod tests;
