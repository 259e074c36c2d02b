//! Bank routes for donations and support grants.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;

use super::auth::AuthUser;
use crate::credits::Credits;
use crate::error::EconomyError;
use crate::services::ledger::{BankReceipt, BankStatus};
use crate::state::{AppState, now_ms};

#[derive(Debug, Deserialize)]
pub struct Donate {
    pub amount: Credits,
}

/// `GET /api/bank`
pub async fn status(State(state): State<AppState>, auth: AuthUser) -> Result<Json<BankStatus>, EconomyError> {
    Ok(Json(state.ledger.bank_status(auth.user.id, now_ms()).await?))
}

/// `POST /api/bank/donate`
pub async fn donate(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<Donate>,
) -> Result<Json<BankReceipt>, EconomyError> {
    Ok(Json(state.ledger.donate(auth.user.id, body.amount, now_ms()).await?))
}

/// `POST /api/bank/support`
pub async fn support(State(state): State<AppState>, auth: AuthUser) -> Result<Json<BankReceipt>, EconomyError> {
    Ok(Json(state.ledger.request_support(auth.user.id, now_ms()).await?))
}

#[cfg(test)]
#[path = "bank_test.rs"]
mod tests;
