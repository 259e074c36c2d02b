use super::*;

#[test]
fn codes_are_stable() {
    let session_id = Uuid::new_v4();
    assert_eq!(EconomyError::SessionNotFound(session_id).error_code(), "E_SESSION_NOT_FOUND");
    assert_eq!(EconomyError::InvalidState("session already ended").error_code(), "E_INVALID_STATE");
    assert!(!EconomyError::NotEligible("cooldown").retryable());
}

#[test]
fn insufficient_funds_message_shows_amounts() {
    let err = EconomyError::InsufficientFunds { needed: Credits::whole(6), available: Credits::whole(5) };
    assert_eq!(err.to_string(), "insufficient funds: 6.00 required, 5.00 available");
}

#[test]
fn every_variant_has_a_distinct_code() {
    let id = Uuid::new_v4();
    let errors = [
        EconomyError::Unauthorized { user_id: id, session_id: id },
        EconomyError::InvalidState("x"),
        EconomyError::InsufficientFunds { needed: Credits::ZERO, available: Credits::ZERO },
        EconomyError::NotEligible("x"),
        EconomyError::MalformedInput("x".into()),
        EconomyError::SessionNotFound(id),
        EconomyError::UserNotFound(id),
    ];
    let mut codes: Vec<&str> = errors.iter().map(ErrorCode::error_code).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
}
