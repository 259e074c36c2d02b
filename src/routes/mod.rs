//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the HTTP API and the session relay websocket under a
//! single Axum router. Handlers translate between HTTP and the services
//! layer; domain errors become `{ "error": { "code", "message" } }` bodies.

pub mod auth;
pub mod bank;
pub mod sessions;
pub mod users;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{EconomyError, ErrorCode};
use crate::state::AppState;

/// API routes plus the relay websocket.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/users", post(users::create_user))
        .route("/api/users/{id}", get(users::get_user))
        .route("/api/users/{id}/ledger", get(users::ledger))
        .route("/api/sessions", post(sessions::create))
        .route("/api/sessions/{id}", get(sessions::get))
        .route("/api/sessions/{id}/chat", get(sessions::chat))
        .route("/api/sessions/{id}/timer/start", post(sessions::start_timer))
        .route("/api/sessions/{id}/timer/stop", post(sessions::stop_timer))
        .route("/api/sessions/{id}/end", post(sessions::end))
        .route("/api/sessions/{id}/state", post(sessions::save_state))
        .route("/api/sessions/{id}/ws", get(ws::handle_ws))
        .route("/api/bank", get(bank::status))
        .route("/api/bank/donate", post(bank::donate))
        .route("/api/bank/support", post(bank::support))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub(crate) fn error_status(err: &EconomyError) -> StatusCode {
    match err {
        EconomyError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        EconomyError::InvalidState(_) => StatusCode::CONFLICT,
        EconomyError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        EconomyError::NotEligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EconomyError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        EconomyError::SessionNotFound(_) | EconomyError::UserNotFound(_) => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for EconomyError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "retryable": self.retryable(),
            }
        });
        (error_status(&self), Json(body)).into_response()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
