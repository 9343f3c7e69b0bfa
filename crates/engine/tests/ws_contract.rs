use maplive_common::protocol::ws::{LiveMessage, CURRENT_PROTOCOL_VERSION};
use maplive_common::types::{
    GeoPoint, LeaderboardEntry, ParticipantInfo, QuestionKind, QuestionOption, ResponsePayload,
    SessionStatus, WordCloudTally,
};
use serde_json::Value;
use uuid::Uuid;

const ENGINE_WS_SOURCE: &str = include_str!("../src/ws/mod.rs");

#[test]
fn websocket_contract_heartbeat_and_frame_limits() {
    let heartbeat_interval_ms = parse_u64_const(ENGINE_WS_SOURCE, "HEARTBEAT_INTERVAL_MS");
    let heartbeat_timeout_ms = parse_u64_const(ENGINE_WS_SOURCE, "HEARTBEAT_TIMEOUT_MS");
    let max_frame_bytes = parse_u64_const(ENGINE_WS_SOURCE, "MAX_FRAME_BYTES");

    assert_eq!(heartbeat_interval_ms, 15_000);
    assert_eq!(heartbeat_timeout_ms, 10_000);
    assert_eq!(max_frame_bytes, 65_536);
    assert!(
        heartbeat_timeout_ms <= heartbeat_interval_ms,
        "an unanswered ping must be detectable at the next heartbeat tick",
    );
}

#[test]
fn websocket_contract_protocol_version_is_live_v1() {
    assert_eq!(CURRENT_PROTOCOL_VERSION, "live.v1");
}

#[test]
fn websocket_contract_message_shapes() {
    let round_id = Uuid::new_v4();
    let question_id = Uuid::new_v4();
    let participant_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    let entry = LeaderboardEntry {
        participant_id,
        display_name: "Alice".to_string(),
        score: 1375,
        rank: 1,
        accuracy: Some(1.0),
        avg_response_ms: Some(5_000),
    };

    let samples = [
        (
            LiveMessage::Join {
                code: "424242".to_string(),
                display_name: "Alice".to_string(),
                participant_id: Some(participant_id),
            },
            "join",
            &["type", "code", "display_name", "participant_id"][..],
        ),
        (
            LiveMessage::Joined {
                participant_id,
                session_id,
                status: SessionStatus::Running,
                seq: 4,
            },
            "joined",
            &["type", "participant_id", "session_id", "status", "seq"][..],
        ),
        (
            LiveMessage::ActivateQuestion {
                presenter_token: "token".to_string(),
                question_id,
            },
            "activate_question",
            &["type", "presenter_token", "question_id"][..],
        ),
        (
            LiveMessage::SubmitResponse {
                round_id,
                payload: ResponsePayload::Pin { point: GeoPoint { lat: 10.776, lng: 106.700 } },
            },
            "submit_response",
            &["type", "round_id", "payload"][..],
        ),
        (
            LiveMessage::SessionStatusChanged { status: SessionStatus::Paused, seq: 5 },
            "session_status_changed",
            &["type", "status", "seq"][..],
        ),
        (
            LiveMessage::QuestionActivated {
                round_id,
                question_id,
                kind: QuestionKind::MultipleChoice,
                prompt: "Which layer shows rivers?".to_string(),
                options: vec![QuestionOption { id: Uuid::new_v4(), label: "Hydrography".into() }],
                point_value: 1000,
                time_limit_ms: 20_000,
                activated_at: chrono::Utc::now(),
                seq: 6,
            },
            "question_activated",
            &[
                "type",
                "round_id",
                "question_id",
                "kind",
                "prompt",
                "options",
                "point_value",
                "time_limit_ms",
                "activated_at",
                "seq",
            ][..],
        ),
        (
            LiveMessage::RoundClosed {
                round_id,
                correct_answer: None,
                word_cloud: Some(WordCloudTally { words: vec![("vivid".to_string(), 2)] }),
                seq: 7,
            },
            "round_closed",
            &["type", "round_id", "word_cloud", "seq"][..],
        ),
        (
            LiveMessage::AnswerFeedback {
                round_id,
                is_correct: true,
                points_awarded: 1375,
                correct_answer: None,
            },
            "answer_feedback",
            &["type", "round_id", "is_correct", "points_awarded"][..],
        ),
        (
            LiveMessage::LeaderboardUpdated { entries: vec![entry.clone()], seq: 8 },
            "leaderboard_updated",
            &["type", "entries", "seq"][..],
        ),
        (
            LiveMessage::SessionEnded { final_leaderboard: vec![entry], seq: 9 },
            "session_ended",
            &["type", "final_leaderboard", "seq"][..],
        ),
        (
            LiveMessage::TeacherFocusChanged { lat: 10.8, lng: 106.7, zoom: 12.0, seq: 10 },
            "teacher_focus_changed",
            &["type", "lat", "lng", "zoom", "seq"][..],
        ),
        (
            LiveMessage::ParticipantRoster {
                participants: vec![ParticipantInfo {
                    id: participant_id,
                    display_name: "Alice".to_string(),
                    connected: true,
                    score: 1375,
                    joined_at: chrono::Utc::now(),
                }],
                seq: 11,
            },
            "participant_roster",
            &["type", "participants", "seq"][..],
        ),
        (
            LiveMessage::StateSnapshot {
                session_id,
                status: SessionStatus::Running,
                seq: 12,
                round: None,
                leaderboard: Vec::new(),
            },
            "state_snapshot",
            &["type", "session_id", "status", "seq", "leaderboard"][..],
        ),
        (
            LiveMessage::Error {
                code: "ROUND_CLOSED".to_string(),
                message: "round is closed".to_string(),
                retryable: false,
            },
            "error",
            &["type", "code", "message", "retryable"][..],
        ),
    ];

    for (message, expected_type, expected_keys) in samples {
        let value = serde_json::to_value(message).expect("live message should serialize");
        assert_eq!(value["type"], expected_type);
        for key in expected_keys {
            assert!(
                value.get(key).is_some(),
                "serialized `{expected_type}` frame must include `{key}`",
            );
        }
    }
}

#[test]
fn websocket_contract_optional_fields_are_omitted_when_absent() {
    let join_without_id = LiveMessage::Join {
        code: "424242".to_string(),
        display_name: "Alice".to_string(),
        participant_id: None,
    };
    let close_without_answer =
        LiveMessage::RoundClosed { round_id: Uuid::new_v4(), correct_answer: None, word_cloud: None, seq: 1 };
    let snapshot_without_round = LiveMessage::StateSnapshot {
        session_id: Uuid::new_v4(),
        status: SessionStatus::Pending,
        seq: 0,
        round: None,
        leaderboard: Vec::new(),
    };

    let join_json = serde_json::to_value(join_without_id).expect("join should serialize");
    let close_json = serde_json::to_value(close_without_answer).expect("close should serialize");
    let snapshot_json =
        serde_json::to_value(snapshot_without_round).expect("snapshot should serialize");

    assert!(!object_keys(&join_json).contains(&"participant_id".to_string()));
    assert!(!object_keys(&close_json).contains(&"correct_answer".to_string()));
    assert!(!object_keys(&close_json).contains(&"word_cloud".to_string()));
    assert!(!object_keys(&snapshot_json).contains(&"round".to_string()));
}

#[test]
fn websocket_contract_client_frames_parse_from_raw_json() {
    let raw = r#"{"type":"join","code":"424242","display_name":"Alice"}"#;
    let parsed: LiveMessage = serde_json::from_str(raw).expect("join frame should parse");
    assert!(matches!(parsed, LiveMessage::Join { participant_id: None, .. }));

    let raw = r#"{"type":"submit_response","round_id":"7f4df0f8-3a68-43fc-9a0f-3d8f17f6b3a1","payload":{"kind":"text","text":"estuary"}}"#;
    let parsed: LiveMessage = serde_json::from_str(raw).expect("submit frame should parse");
    assert!(matches!(parsed, LiveMessage::SubmitResponse { .. }));

    let raw = r#"{"type":"state_request"}"#;
    let parsed: LiveMessage = serde_json::from_str(raw).expect("state_request should parse");
    assert!(matches!(parsed, LiveMessage::StateRequest {}));
}

fn object_keys(value: &Value) -> Vec<String> {
    let mut keys =
        value.as_object().expect("value should be an object").keys().cloned().collect::<Vec<_>>();
    keys.sort();
    keys
}

fn parse_u64_const(source: &str, name: &str) -> u64 {
    let needle = format!("const {name}:");
    let index = source.find(&needle).expect("constant must be declared");
    let line = source[index..].lines().next().expect("constant declaration line must exist");
    let raw_value = line
        .split('=')
        .nth(1)
        .expect("constant must have assignment")
        .trim()
        .trim_end_matches(';')
        .replace('_', "");
    raw_value
        .parse::<u64>()
        .unwrap_or_else(|error| panic!("failed to parse `{name}` from `{line}`: {error}"))
}
