use super::*;
use crate::state::test_helpers::{seed_user, test_app_state};

async fn auth(state: &AppState, user_id: Uuid) -> AuthUser {
    AuthUser { user: state.ledger.user(user_id).await.expect("user") }
}

#[tokio::test]
async fn create_user_grants_signup_credits() {
    let state = test_app_state();
    let (status, Json(user)) = create_user(State(state.clone()), Json(CreateUser { name: "  alice ".into() }))
        .await
        .expect("create");
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user.name, "alice");
    assert_eq!(user.balance, Credits::whole(15));
}

#[tokio::test]
async fn create_user_rejects_blank_name() {
    let state = test_app_state();
    let err = create_user(State(state), Json(CreateUser { name: "   ".into() }))
        .await
        .expect_err("blank name");
    assert!(matches!(err, EconomyError::MalformedInput(_)));
}

#[tokio::test]
async fn balance_is_private_to_owner() {
    let state = test_app_state();
    let a = seed_user(&state, "alice", Credits::whole(7)).await;
    let b = seed_user(&state, "bob", Credits::whole(9)).await;

    let Json(own) = get_user(State(state.clone()), auth(&state, a).await, Path(a)).await.expect("own");
    assert_eq!(own.balance, Some(Credits::whole(7)));

    let Json(other) = get_user(State(state.clone()), auth(&state, a).await, Path(b)).await.expect("other");
    assert_eq!(other.balance, None);
    assert_eq!(other.name, "bob");
}

#[tokio::test]
async fn ledger_is_owner_only() {
    let state = test_app_state();
    let a = seed_user(&state, "alice", Credits::whole(7)).await;
    let b = seed_user(&state, "bob", Credits::whole(9)).await;

    let own = ledger(State(state.clone()), auth(&state, a).await, Path(a)).await;
    assert_eq!(own.status(), StatusCode::OK);
    let other = ledger(State(state.clone()), auth(&state, a).await, Path(b)).await;
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}
