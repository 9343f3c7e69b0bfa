// Core domain types shared across all MapLive crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a live session.
///
/// `Ended` is terminal; no transition leaves it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Ended,
}

impl SessionStatus {
    /// Whether a transition from `self` to `next` is legal.
    ///
    /// `Pending → Running → {Paused ↔ Running} → Ended`. Ending is allowed
    /// from any non-terminal state so a presenter can abandon a session
    /// that never started.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Ended, _) => false,
            (Pending, Running) => true,
            (Running, Paused) => true,
            (Paused, Running) => true,
            (Pending | Running | Paused, Ended) => true,
            _ => false,
        }
    }
}

/// The kind of question a round poses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    WordCloud,
    PinOnMap,
}

/// A WGS84 coordinate (degrees).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// The presenter's current map viewport, broadcast for follow-along mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MapViewport {
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
}

/// A selectable option for multiple-choice and true/false questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionOption {
    pub id: Uuid,
    pub label: String,
}

/// The correct-answer specification for a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSpec {
    /// Correct option id(s) for multiple-choice / true-false.
    Options { correct: Vec<Uuid> },
    /// Accepted answer texts for short-answer (compared trimmed,
    /// case-insensitive).
    Text { accepted: Vec<String> },
    /// Target coordinate plus acceptance radius in meters for pin-on-map.
    Pin { target: GeoPoint, radius_m: f64 },
    /// No correct answer (word cloud).
    None,
}

/// A question definition supplied when the session is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionDef {
    pub id: Uuid,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    pub answer: AnswerSpec,
    pub point_value: u32,
    pub time_limit_ms: u64,
}

/// A participant's submitted answer payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePayload {
    Option { option_id: Uuid },
    Text { text: String },
    Pin { point: GeoPoint },
}

/// Snapshot of the currently active round, as sent to clients.
///
/// Carries the absolute `activated_at` timestamp (not a relative
/// countdown) so clients compute remaining time locally and stay correct
/// across clock drift and reconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveRound {
    pub round_id: Uuid,
    pub question_id: Uuid,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    pub point_value: u32,
    pub time_limit_ms: u64,
    pub activated_at: DateTime<Utc>,
}

/// One ranked row of the leaderboard. Derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub participant_id: Uuid,
    pub display_name: String,
    pub score: u64,
    pub rank: u32,
    /// Fraction of scored responses that were correct, if any were made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Mean response latency across scored responses, if any were made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_ms: Option<u64>,
}

/// Roster view of a participant, pushed on join/leave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantInfo {
    pub id: Uuid,
    pub display_name: String,
    pub connected: bool,
    pub score: u64,
    pub joined_at: DateTime<Utc>,
}

/// Aggregated word frequencies for a word-cloud round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WordCloudTally {
    /// (word, count), sorted by descending count then word.
    pub words: Vec<(String, u32)>,
}
