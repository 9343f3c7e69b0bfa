// Question round state: activation window, recorded responses, and the
// word-cloud tally.

use chrono::{DateTime, Utc};
use maplive_common::types::{ActiveRound, QuestionDef, ResponsePayload, WordCloudTally};
use std::collections::HashMap;
use uuid::Uuid;

/// An accepted response. At most one exists per (participant, round);
/// later submissions are rejected, never overwritten.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub participant_id: Uuid,
    pub round_id: Uuid,
    pub payload: ResponsePayload,
    pub received_at: DateTime<Utc>,
    pub is_correct: bool,
    pub points: u64,
}

/// The activation window for a single question. One active round per
/// session at a time.
#[derive(Debug)]
pub struct RoundState {
    pub round_id: Uuid,
    pub question: QuestionDef,
    pub activated_at: DateTime<Utc>,
    /// Increments with every activation in the session; the close timer
    /// carries it so a stale timer can never close a later round.
    pub generation: u64,
    pub closed: bool,
    responses: HashMap<Uuid, ResponseRecord>,
    word_tally: HashMap<String, u32>,
}

impl RoundState {
    pub fn new(question: QuestionDef, generation: u64, activated_at: DateTime<Utc>) -> Self {
        Self {
            round_id: Uuid::new_v4(),
            question,
            activated_at,
            generation,
            closed: false,
            responses: HashMap::new(),
            word_tally: HashMap::new(),
        }
    }

    /// Server-side elapsed time since activation, saturating at zero if
    /// the wall clock stepped backwards.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.activated_at).num_milliseconds().max(0) as u64
    }

    pub fn has_response(&self, participant_id: Uuid) -> bool {
        self.responses.contains_key(&participant_id)
    }

    pub fn record(&mut self, record: ResponseRecord) {
        self.responses.insert(record.participant_id, record);
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    pub fn tally_word(&mut self, word: String) {
        *self.word_tally.entry(word).or_insert(0) += 1;
    }

    /// Aggregated word frequencies, descending by count then word.
    pub fn word_cloud(&self) -> WordCloudTally {
        let mut words: Vec<(String, u32)> =
            self.word_tally.iter().map(|(w, c)| (w.clone(), *c)).collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        WordCloudTally { words }
    }

    /// Client-facing snapshot of this round. Never includes the answer
    /// spec.
    pub fn to_active(&self) -> ActiveRound {
        ActiveRound {
            round_id: self.round_id,
            question_id: self.question.id,
            kind: self.question.kind,
            prompt: self.question.prompt.clone(),
            options: self.question.options.clone(),
            point_value: self.question.point_value,
            time_limit_ms: self.question.time_limit_ms,
            activated_at: self.activated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use maplive_common::types::{AnswerSpec, QuestionKind};

    fn word_cloud_question() -> QuestionDef {
        QuestionDef {
            id: Uuid::new_v4(),
            kind: QuestionKind::WordCloud,
            prompt: "One word?".into(),
            options: Vec::new(),
            answer: AnswerSpec::None,
            point_value: 0,
            time_limit_ms: 20_000,
        }
    }

    #[test]
    fn elapsed_saturates_at_zero() {
        let now = Utc::now();
        let round = RoundState::new(word_cloud_question(), 1, now + Duration::seconds(10));
        assert_eq!(round.elapsed_ms(now), 0);
    }

    #[test]
    fn word_cloud_sorted_by_count_then_word() {
        let mut round = RoundState::new(word_cloud_question(), 1, Utc::now());
        for word in ["vivid", "bold", "vivid", "calm", "bold", "vivid"] {
            round.tally_word(word.into());
        }
        let tally = round.word_cloud();
        assert_eq!(
            tally.words,
            vec![("vivid".to_string(), 3), ("bold".to_string(), 2), ("calm".to_string(), 1)]
        );
    }

    #[test]
    fn active_snapshot_never_leaks_answer() {
        let round = RoundState::new(word_cloud_question(), 1, Utc::now());
        let active = round.to_active();
        let json = serde_json::to_value(&active).unwrap();
        assert!(json.get("answer").is_none());
        assert_eq!(json["round_id"], serde_json::json!(round.round_id));
    }
}
