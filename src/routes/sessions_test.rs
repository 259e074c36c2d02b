use super::*;
use crate::credits::Credits;
use crate::state::test_helpers::{seed_session, seed_user, test_app_state};

async fn auth(state: &AppState, user_id: Uuid) -> AuthUser {
    AuthUser { user: state.ledger.user(user_id).await.expect("user") }
}

#[tokio::test]
async fn create_returns_created_then_ok() {
    let state = test_app_state();
    let a = seed_user(&state, "alice", Credits::whole(15)).await;
    let b = seed_user(&state, "bob", Credits::whole(15)).await;

    let body = Json(CreateSession { partner_id: b });
    let (status, Json(first)) = create(State(state.clone()), auth(&state, a).await, body)
        .await
        .expect("create");
    assert_eq!(status, StatusCode::CREATED);

    let body = Json(CreateSession { partner_id: a });
    let (status, Json(second)) = create(State(state.clone()), auth(&state, b).await, body)
        .await
        .expect("reuse");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn outsider_is_forbidden() {
    let state = test_app_state();
    let (session_id, _a, _b) = seed_session(&state, Credits::whole(15)).await;
    let outsider = seed_user(&state, "eve", Credits::whole(15)).await;

    let err = get(State(state.clone()), auth(&state, outsider).await, Path(session_id))
        .await
        .expect_err("outsider");
    assert!(matches!(err, EconomyError::Unauthorized { .. }));
}

#[tokio::test]
async fn timer_and_end_flow() {
    let state = test_app_state();
    let (session_id, a, b) = seed_session(&state, Credits::whole(15)).await;

    let Json(timer) = start_timer(State(state.clone()), auth(&state, a).await, Path(session_id))
        .await
        .expect("start");
    assert_eq!(timer.teacher_id, a);

    let Json(stopped) = stop_timer(State(state.clone()), auth(&state, b).await, Path(session_id))
        .await
        .expect("stop");
    assert_eq!(stopped.id, timer.id);

    let Json(ended) = end(State(state.clone()), auth(&state, b).await, Path(session_id))
        .await
        .expect("end");
    assert!(!ended.session.is_active);

    let err = end(State(state.clone()), auth(&state, a).await, Path(session_id))
        .await
        .expect_err("second end");
    assert_eq!(err, EconomyError::InvalidState("session already ended"));
}

#[tokio::test]
async fn save_state_and_chat_history() {
    let state = test_app_state();
    let (session_id, a, _b) = seed_session(&state, Credits::whole(15)).await;

    let Json(saved) = save_state(
        State(state.clone()),
        auth(&state, a).await,
        Path(session_id),
        Json(SaveState { whiteboard: Some("[]".into()), ..SaveState::default() }),
    )
    .await
    .expect("save");
    assert_eq!(saved.whiteboard_state, "[]");

    let Json(history) = chat(State(state.clone()), auth(&state, a).await, Path(session_id))
        .await
        .expect("chat");
    assert!(history.is_empty());
}
