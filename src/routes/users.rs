//! User routes for signup, profiles and ledger history.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::credits::Credits;
use crate::error::EconomyError;
use crate::services::ledger::LedgerEntry;
use crate::state::{AppState, User, now_ms};

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
}

/// Public view of a user. Balance is shown only to its owner.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub is_online: bool,
    pub last_seen: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Credits>,
}

impl UserProfile {
    fn of(user: User, viewer: Uuid) -> Self {
        let balance = (user.id == viewer).then_some(user.balance);
        Self { id: user.id, name: user.name, is_online: user.is_online, last_seen: user.last_seen, balance }
    }
}

/// `POST /api/users`: open an account with the signup grant.
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), EconomyError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(EconomyError::MalformedInput("name must not be empty".into()));
    }
    let user = state.ledger.open_account(name, now_ms()).await;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /api/users/{id}`: profile, with balance for the owner.
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserProfile>, EconomyError> {
    let user = state
        .ledger
        .user(user_id)
        .await
        .ok_or(EconomyError::UserNotFound(user_id))?;
    Ok(Json(UserProfile::of(user, auth.user.id)))
}

/// `GET /api/users/{id}/ledger`: entry history, newest first. Owner only.
pub async fn ledger(State(state): State<AppState>, auth: AuthUser, Path(user_id): Path<Uuid>) -> Response {
    if auth.user.id != user_id {
        return StatusCode::FORBIDDEN.into_response();
    }
    match state.ledger.entries(user_id).await {
        Ok(entries) => Json::<Vec<LedgerEntry>>(entries).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;
