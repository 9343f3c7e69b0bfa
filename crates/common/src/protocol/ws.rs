// WebSocket message types for the live.v1 protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    ActiveRound, AnswerSpec, LeaderboardEntry, ParticipantInfo, QuestionKind, QuestionOption,
    ResponsePayload, SessionStatus, WordCloudTally,
};

pub const CURRENT_PROTOCOL_VERSION: &str = "live.v1";

/// All message types in the live.v1 WebSocket protocol.
///
/// Server-pushed frames carry a per-session monotonic `seq` and describe
/// absolute state (full leaderboard snapshots, absolute activation
/// timestamps), never deltas: the transport does not guarantee order
/// across reconnects, so clients must be able to apply any frame in
/// isolation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Client -> Server: join a session by code.
    Join {
        code: String,
        display_name: String,
        /// Set when rejoining after a disconnect to keep the same
        /// participant identity and score.
        #[serde(skip_serializing_if = "Option::is_none")]
        participant_id: Option<Uuid>,
    },

    /// Server -> Client: join acknowledgement.
    Joined {
        participant_id: Uuid,
        session_id: Uuid,
        status: SessionStatus,
        seq: u64,
    },

    /// Client -> Server: leave the session permanently.
    Leave {},

    /// Client -> Server (presenter only): start the session.
    StartSession { presenter_token: String },

    /// Client -> Server (presenter only): pause the session.
    PauseSession { presenter_token: String },

    /// Client -> Server (presenter only): end the session.
    EndSession { presenter_token: String },

    /// Client -> Server (presenter only): activate a question round.
    ActivateQuestion {
        presenter_token: String,
        question_id: Uuid,
    },

    /// Client -> Server: submit a response for the active round.
    SubmitResponse {
        round_id: Uuid,
        payload: ResponsePayload,
    },

    /// Client -> Server (presenter only): share the presenter's viewport.
    UpdateTeacherFocus {
        presenter_token: String,
        lat: f64,
        lng: f64,
        zoom: f64,
    },

    /// Client -> Server: request a full state snapshot (after reconnect).
    StateRequest {},

    /// Server -> Client: session status changed.
    SessionStatusChanged { status: SessionStatus, seq: u64 },

    /// Server -> Client: a question round opened.
    QuestionActivated {
        round_id: Uuid,
        question_id: Uuid,
        kind: QuestionKind,
        prompt: String,
        #[serde(default)]
        options: Vec<QuestionOption>,
        point_value: u32,
        time_limit_ms: u64,
        activated_at: DateTime<Utc>,
        seq: u64,
    },

    /// Server -> Client: the active round closed.
    RoundClosed {
        round_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        correct_answer: Option<AnswerSpec>,
        #[serde(skip_serializing_if = "Option::is_none")]
        word_cloud: Option<WordCloudTally>,
        seq: u64,
    },

    /// Server -> Client (submitter only): the verdict on a response.
    AnswerFeedback {
        round_id: Uuid,
        is_correct: bool,
        points_awarded: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        correct_answer: Option<AnswerSpec>,
    },

    /// Server -> Client: full leaderboard snapshot.
    LeaderboardUpdated {
        entries: Vec<LeaderboardEntry>,
        seq: u64,
    },

    /// Server -> Client: the session ended; final standings.
    SessionEnded {
        final_leaderboard: Vec<LeaderboardEntry>,
        seq: u64,
    },

    /// Server -> Client: presenter's viewport for follow-along mode.
    TeacherFocusChanged {
        lat: f64,
        lng: f64,
        zoom: f64,
        seq: u64,
    },

    /// Server -> Client: roster snapshot after a join/leave/disconnect.
    ParticipantRoster {
        participants: Vec<ParticipantInfo>,
        seq: u64,
    },

    /// Server -> Client: full state snapshot for late joiners and
    /// reconnecting clients.
    StateSnapshot {
        session_id: Uuid,
        status: SessionStatus,
        seq: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        round: Option<ActiveRound>,
        leaderboard: Vec<LeaderboardEntry>,
    },

    /// Server -> Client: error.
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}
