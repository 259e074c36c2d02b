//! Domain errors shared by the economy services and HTTP routes.
//!
//! Every error carries a grepable `E_*` code so the collaborator layer can
//! branch on the reason without parsing messages.

use uuid::Uuid;

use crate::credits::Credits;

/// Grepable error code and retryable flag for structured error responses.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EconomyError {
    #[error("user {user_id} is not a participant of session {session_id}")]
    Unauthorized { user_id: Uuid, session_id: Uuid },
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("insufficient funds: {needed} required, {available} available")]
    InsufficientFunds { needed: Credits, available: Credits },
    #[error("not eligible: {0}")]
    NotEligible(&'static str),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("user not found: {0}")]
    UserNotFound(Uuid),
}

impl ErrorCode for EconomyError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::InvalidState(_) => "E_INVALID_STATE",
            Self::InsufficientFunds { .. } => "E_INSUFFICIENT_FUNDS",
            Self::NotEligible(_) => "E_NOT_ELIGIBLE",
            Self::MalformedInput(_) => "E_MALFORMED_INPUT",
            Self::SessionNotFound(_) => "E_SESSION_NOT_FOUND",
            Self::UserNotFound(_) => "E_USER_NOT_FOUND",
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
