// Error-code registry shared by the HTTP and WebSocket surfaces.

use serde::{Deserialize, Serialize};

/// Stable machine-readable error codes for the live session engine.
///
/// No error in this taxonomy is fatal to the process; a malformed command
/// affects only its own session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Illegal session status change; caller is shown the current state.
    InvalidTransition,
    /// Response arrived for a round that is not open.
    RoundClosed,
    /// Duplicate response for the same (participant, round).
    AlreadySubmitted,
    /// Unknown session, round, or participant.
    NotFound,
    /// The realtime channel is not connected; retry the connection,
    /// not the command.
    TransportUnavailable,
    /// Malformed command payload.
    ValidationFailed,
    /// Caller is not allowed to issue this command.
    Forbidden,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::RoundClosed => "ROUND_CLOSED",
            Self::AlreadySubmitted => "ALREADY_SUBMITTED",
            Self::NotFound => "NOT_FOUND",
            Self::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::Forbidden => "FORBIDDEN",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::TransportUnavailable | Self::InternalError)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::InvalidTransition => "illegal session status transition",
            Self::RoundClosed => "the round is no longer accepting responses",
            Self::AlreadySubmitted => "a response was already recorded for this round",
            Self::NotFound => "requested session, round, or participant not found",
            Self::TransportUnavailable => "realtime channel is not connected",
            Self::ValidationFailed => "command validation failed",
            Self::Forbidden => "caller may not issue this command",
            Self::InternalError => "internal engine error",
        }
    }
}

/// An engine error: a registry code plus a human-readable message.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{}: {message}", code.as_str())]
pub struct LiveError {
    pub code: ErrorCode,
    pub message: String,
}

impl LiveError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }
}

pub type LiveResult<T> = Result<T, LiveError>;
