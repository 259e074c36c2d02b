//! Acting-user extraction.
//!
//! Authentication happens upstream; the collaborator asserts the acting user
//! with the `x-user-id` header. The extractor only checks that the user
//! exists in the ledger.

use axum::extract::FromRef;
use axum::http::{HeaderMap, StatusCode};
use uuid::Uuid;

use crate::state::{AppState, User};

pub const USER_HEADER: &str = "x-user-id";

/// Acting user resolved from the `x-user-id` header.
/// Use as a handler parameter to require a known user.
pub struct AuthUser {
    pub user: User,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_user_id(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;
        let app_state = AppState::from_ref(state);
        let user = app_state
            .ledger
            .user(user_id)
            .await
            .ok_or(StatusCode::UNAUTHORIZED)?;
        Ok(Self { user })
    }
}

/// Parse the acting user id from request headers.
#[must_use]
pub fn header_user_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(USER_HEADER)?
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
