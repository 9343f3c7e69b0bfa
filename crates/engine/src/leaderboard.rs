// Leaderboard ranking.
//
// A pure function of participant scoring state: recomputing without
// intervening scoring events yields identical output.

use chrono::{DateTime, Utc};
use maplive_common::types::LeaderboardEntry;
use uuid::Uuid;

/// Per-participant inputs to ranking. Collected from the session's
/// participant registry; never stored on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct RankInput {
    pub participant_id: Uuid,
    pub display_name: String,
    pub score: u64,
    /// Sum of server-side response latencies across correct submissions.
    /// Lower means the participant was both correct and fast.
    pub correct_latency_ms: u64,
    pub first_correct_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    pub scored_count: u32,
    pub correct_count: u32,
    pub total_latency_ms: u64,
}

impl RankInput {
    /// The tie-break key. Two entries share a rank only when score and
    /// this key are both equal; with distinct submission timestamps that
    /// is effectively never true for two active participants.
    fn tie_key(&self) -> (u64, DateTime<Utc>) {
        (
            if self.first_correct_at.is_some() { self.correct_latency_ms } else { u64::MAX },
            self.first_correct_at.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

/// Rank participants: score descending, then earlier cumulative
/// correct-submission latency, then earlier first-correct timestamp.
/// Join time and id only break display order, never rank.
pub fn compute(mut inputs: Vec<RankInput>) -> Vec<LeaderboardEntry> {
    inputs.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.tie_key().cmp(&b.tie_key()))
            .then_with(|| a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    });

    let mut entries = Vec::with_capacity(inputs.len());
    let mut rank = 0u32;
    let mut previous: Option<(u64, (u64, DateTime<Utc>))> = None;
    for input in inputs {
        let key = (input.score, input.tie_key());
        if previous.as_ref() != Some(&key) {
            rank += 1;
            previous = Some(key);
        }
        let accuracy = (input.scored_count > 0)
            .then(|| f64::from(input.correct_count) / f64::from(input.scored_count));
        let avg_response_ms =
            (input.scored_count > 0).then(|| input.total_latency_ms / u64::from(input.scored_count));
        entries.push(LeaderboardEntry {
            participant_id: input.participant_id,
            display_name: input.display_name,
            score: input.score,
            rank,
            accuracy,
            avg_response_ms,
        });
    }
    entries
}
