use super::*;
use crate::credits::Credits;
use crate::services::settlement::{Rates, settle};
use serde_json::json;

#[test]
fn parses_every_inbound_kind() {
    let cases = [
        (r#"{"type":"chat","content":"hi"}"#, "chat"),
        (r#"{"type":"timer","action":"start"}"#, "timer"),
        (r#"{"type":"whiteboard","data":{"op":"clear"}}"#, "whiteboard"),
        (r#"{"type":"code_change","code":"x","language":"rust"}"#, "code_change"),
        (r#"{"type":"video_signal","data":{"candidate":"c"}}"#, "video_signal"),
    ];
    for (text, kind) in cases {
        let event = Inbound::parse(text).unwrap_or_else(|e| panic!("{text}: {e}"));
        assert_eq!(event.kind(), kind);
    }
}

#[test]
fn rejects_unknown_and_incomplete_events() {
    for text in [
        "",
        "[]",
        r#"{"content":"no type"}"#,
        r#"{"type":"teleport"}"#,
        r#"{"type":"timer","action":"pause"}"#,
        r#"{"type":"code_change","code":"x"}"#,
    ] {
        let err = Inbound::parse(text).expect_err(text);
        assert!(matches!(err, EconomyError::MalformedInput(_)), "{text}");
    }
}

#[test]
fn echo_rules() {
    let user_id = Uuid::new_v4();
    let settlement = settle(
        (Uuid::new_v4(), 0),
        (Uuid::new_v4(), 0),
        Rates { credits_per_block: Credits::whole(1), bank_cut_percent: 10 },
    );

    let include = [
        Outbound::Chat { sender: "a".into(), sender_id: user_id, content: "x".into() },
        Outbound::Timer { action: TimerAction::Stop, user_id, user_name: "a".into() },
        Outbound::SessionEnded { redirect_url: "/".into(), settlement },
    ];
    let exclude = [
        Outbound::Whiteboard { data: json!({}) },
        Outbound::CodeChange { code: String::new(), language: "js".into() },
        Outbound::VideoSignal { data: json!(null) },
    ];
    assert!(include.iter().all(|e| e.echo() == Echo::IncludeSender));
    assert!(exclude.iter().all(|e| e.echo() == Echo::ExcludeSender));
}

#[test]
fn outbound_wire_shape() {
    let user_id = Uuid::nil();
    let chat = Outbound::Chat { sender: "alice".into(), sender_id: user_id, content: "hi".into() };
    assert_eq!(
        serde_json::to_value(&chat).expect("serialize"),
        json!({"type": "chat", "sender": "alice", "sender_id": user_id, "content": "hi"})
    );

    let timer = Outbound::Timer { action: TimerAction::Start, user_id, user_name: "alice".into() };
    assert_eq!(
        serde_json::to_value(&timer).expect("serialize"),
        json!({"type": "timer", "action": "start", "user_id": user_id, "user_name": "alice"})
    );
}

#[test]
fn session_ended_carries_settlement_amounts() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let settlement = settle((a, 720), (b, 0), Rates { credits_per_block: Credits::whole(1), bank_cut_percent: 10 });
    let event = Outbound::SessionEnded { redirect_url: "/session/x/review/".into(), settlement };

    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["type"], "session_ended");
    assert_eq!(value["redirect_url"], "/session/x/review/");
    assert_eq!(value["settlement"]["bank_cut"], json!(0.2));
    assert_eq!(value["settlement"]["a"]["net"], json!(1.8));
}
