// Response correctness and point computation.
//
// All elapsed times are server-side: activation timestamp to receipt
// timestamp. Client clocks are never consulted, so clock manipulation
// cannot inflate the speed bonus.

use maplive_common::error::{ErrorCode, LiveError, LiveResult};
use maplive_common::types::{AnswerSpec, GeoPoint, QuestionDef, QuestionKind, ResponsePayload};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Seam for configurable short-answer matching. The shipped behavior is
/// trimmed, case-insensitive exact match; a fuzzy matcher can be swapped
/// in without touching the scoring path.
pub trait AnswerMatcher: Send + Sync {
    fn matches(&self, accepted: &[String], submitted: &str) -> bool;
}

/// Default matcher: trimmed, case-insensitive exact comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl AnswerMatcher for ExactMatcher {
    fn matches(&self, accepted: &[String], submitted: &str) -> bool {
        let submitted = normalize_answer(submitted);
        accepted.iter().any(|candidate| normalize_answer(candidate) == submitted)
    }
}

pub fn normalize_answer(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Great-circle distance between two WGS84 coordinates, in meters.
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Decide whether a payload answers the question correctly.
///
/// Word-cloud submissions are always "correct": they are tallied, not
/// graded. A payload whose shape does not match the question kind is a
/// validation error, not an incorrect answer.
pub fn evaluate(
    question: &QuestionDef,
    payload: &ResponsePayload,
    matcher: &dyn AnswerMatcher,
) -> LiveResult<bool> {
    match (question.kind, &question.answer, payload) {
        (
            QuestionKind::MultipleChoice | QuestionKind::TrueFalse,
            AnswerSpec::Options { correct },
            ResponsePayload::Option { option_id },
        ) => Ok(correct.contains(option_id)),
        (
            QuestionKind::ShortAnswer,
            AnswerSpec::Text { accepted },
            ResponsePayload::Text { text },
        ) => Ok(matcher.matches(accepted, text)),
        (
            QuestionKind::PinOnMap,
            AnswerSpec::Pin { target, radius_m },
            ResponsePayload::Pin { point },
        ) => Ok(haversine_distance_m(*target, *point) <= *radius_m),
        (QuestionKind::WordCloud, _, ResponsePayload::Text { text }) => {
            if normalize_answer(text).is_empty() {
                Err(LiveError::new(ErrorCode::ValidationFailed, "empty word-cloud submission"))
            } else {
                Ok(true)
            }
        }
        _ => Err(LiveError::new(
            ErrorCode::ValidationFailed,
            "response payload does not match question kind",
        )),
    }
}

/// Points for a scored response.
///
/// `base = is_correct ? point_value : 0`;
/// `bonus = floor(base * 0.5 * (1 - elapsed/time_limit))`, clamped at 0
/// when the response lands at or past the limit. Word-cloud rounds award
/// no points (callers pass `point_value = 0`).
pub fn award_points(is_correct: bool, point_value: u32, elapsed_ms: u64, time_limit_ms: u64) -> u64 {
    if !is_correct || point_value == 0 {
        return 0;
    }
    let base = u64::from(point_value);
    if time_limit_ms == 0 {
        return base;
    }
    let remaining = 1.0 - (elapsed_ms.min(time_limit_ms) as f64 / time_limit_ms as f64);
    let bonus = (base as f64 * 0.5 * remaining).floor() as u64;
    base + bonus
}
