// One live session: state machine, round controller, scoring, and
// broadcast wiring.
//
// All mutations to a session go through the handle's mutex, so the two
// racing round-close triggers (timer vs. last response) and presenter
// status changes serialize cleanly. Different sessions share nothing but
// the registry's lookup table.

pub mod round;
pub mod scoring;

use crate::broadcast::BroadcastGroup;
use crate::leaderboard::{self, RankInput};
use crate::store::{PersistedResponse, PersistedSession, SessionStore};
use chrono::{DateTime, Utc};
use maplive_common::error::{ErrorCode, LiveError, LiveResult};
use maplive_common::protocol::ws::LiveMessage;
use maplive_common::types::{
    ActiveRound, AnswerSpec, LeaderboardEntry, MapViewport, ParticipantInfo, QuestionDef,
    QuestionKind, ResponsePayload, SessionStatus,
};
use round::{ResponseRecord, RoundState};
use scoring::{AnswerMatcher, ExactMatcher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delay between a round closing and the next question opening when the
/// presenter has opted into auto-advance.
pub(crate) const AUTO_ADVANCE_COOLDOWN_MS: u64 = 5_000;

/// Why a round closed. Both paths funnel into the same close routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Timeout,
    AllResponded,
}

#[derive(Debug)]
struct Participant {
    id: Uuid,
    display_name: String,
    score: u64,
    connected: bool,
    joined_at: DateTime<Utc>,
    scored_count: u32,
    correct_count: u32,
    total_latency_ms: u64,
    correct_latency_ms: u64,
    first_correct_at: Option<DateTime<Utc>>,
}

impl Participant {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            display_name: self.display_name.clone(),
            connected: self.connected,
            score: self.score,
            joined_at: self.joined_at,
        }
    }

    fn rank_input(&self) -> RankInput {
        RankInput {
            participant_id: self.id,
            display_name: self.display_name.clone(),
            score: self.score,
            correct_latency_ms: self.correct_latency_ms,
            first_correct_at: self.first_correct_at,
            joined_at: self.joined_at,
            scored_count: self.scored_count,
            correct_count: self.correct_count,
            total_latency_ms: self.total_latency_ms,
        }
    }
}

struct SessionState {
    code: String,
    presenter_id: Uuid,
    presenter_token: String,
    status: SessionStatus,
    seq: u64,
    questions: Vec<QuestionDef>,
    auto_advance: bool,
    current_round: Option<RoundState>,
    round_generation: u64,
    timer: Option<AbortHandle>,
    participants: HashMap<Uuid, Participant>,
    group: BroadcastGroup,
    last_focus: Option<MapViewport>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
    store: SessionStore,
    matcher: Arc<dyn AnswerMatcher>,
}

/// Serialized-access handle to one live session.
pub struct SessionHandle {
    pub id: Uuid,
    state: Mutex<SessionState>,
}

/// What a joining client gets back before its first snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedInfo {
    pub participant_id: Uuid,
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub seq: u64,
}

impl SessionHandle {
    pub fn new(
        code: String,
        presenter_id: Uuid,
        presenter_token: String,
        questions: Vec<QuestionDef>,
        auto_advance: bool,
        store: SessionStore,
    ) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: Mutex::new(SessionState {
                code,
                presenter_id,
                presenter_token,
                status: SessionStatus::Pending,
                seq: 0,
                questions,
                auto_advance,
                current_round: None,
                round_generation: 0,
                timer: None,
                participants: HashMap::new(),
                group: BroadcastGroup::default(),
                last_focus: None,
                created_at: now,
                started_at: None,
                ended_at: None,
                last_activity: now,
                store,
                matcher: Arc::new(ExactMatcher),
            }),
        })
    }

    pub async fn code(&self) -> String {
        self.state.lock().await.code.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    /// Join (or rejoin) as a participant and register the outbound sender.
    ///
    /// A rejoin with a known `participant_id` keeps the same identity and
    /// score; the reconnecting client then requests a state snapshot
    /// instead of replaying missed events.
    pub async fn join(
        &self,
        display_name: String,
        participant_id: Option<Uuid>,
        sender: mpsc::UnboundedSender<LiveMessage>,
    ) -> LiveResult<JoinedInfo> {
        let mut state = self.state.lock().await;
        if state.status == SessionStatus::Ended {
            return Err(LiveError::new(ErrorCode::NotFound, "session has ended"));
        }
        let display_name = display_name.trim().to_owned();
        if display_name.is_empty() {
            return Err(LiveError::new(ErrorCode::ValidationFailed, "display name is required"));
        }

        let id = match participant_id {
            Some(id) if state.participants.contains_key(&id) => {
                let participant = state.participants.get_mut(&id).expect("checked above");
                participant.connected = true;
                debug!(session_id = %self.id, participant_id = %id, "participant reconnected");
                id
            }
            _ => {
                let id = participant_id.unwrap_or_else(Uuid::new_v4);
                state.participants.insert(
                    id,
                    Participant {
                        id,
                        display_name: display_name.clone(),
                        score: 0,
                        connected: true,
                        joined_at: Utc::now(),
                        scored_count: 0,
                        correct_count: 0,
                        total_latency_ms: 0,
                        correct_latency_ms: 0,
                        first_correct_at: None,
                    },
                );
                info!(session_id = %self.id, participant_id = %id, "participant joined");
                id
            }
        };
        state.group.register_member(id, sender);
        state.last_activity = Utc::now();

        let info =
            JoinedInfo { participant_id: id, session_id: self.id, status: state.status, seq: state.seq };
        Self::broadcast_roster(&mut state);
        Ok(info)
    }

    /// Bind the presenter's connection to this session.
    pub async fn register_presenter(
        &self,
        presenter_token: &str,
        sender: mpsc::UnboundedSender<LiveMessage>,
    ) -> LiveResult<()> {
        let mut state = self.state.lock().await;
        Self::check_presenter(&state, presenter_token)?;
        state.group.register_presenter(sender);
        state.last_activity = Utc::now();
        Ok(())
    }

    /// Presenter-requested status change. Invalid transitions fail with
    /// `InvalidTransition` and produce no side effects.
    pub async fn transition(
        self: &Arc<Self>,
        presenter_token: &str,
        target: SessionStatus,
    ) -> LiveResult<SessionStatus> {
        let mut state = self.state.lock().await;
        Self::check_presenter(&state, presenter_token)?;
        if !state.status.can_transition_to(target) {
            return Err(LiveError::new(
                ErrorCode::InvalidTransition,
                format!("cannot go from {:?} to {:?}", state.status, target),
            ));
        }

        let now = Utc::now();
        state.status = target;
        state.last_activity = now;
        match target {
            SessionStatus::Running => {
                if state.started_at.is_none() {
                    state.started_at = Some(now);
                }
            }
            SessionStatus::Ended => {
                state.ended_at = Some(now);
                // Ending cancels any pending round timer; the round is
                // abandoned without a RoundClosed frame because
                // SessionEnded supersedes it.
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                if let Some(round) = state.current_round.as_mut() {
                    round.closed = true;
                }
            }
            _ => {}
        }

        info!(session_id = %self.id, status = ?target, "session status changed");
        Self::emit(&mut state, |seq| LiveMessage::SessionStatusChanged { status: target, seq });
        if target == SessionStatus::Ended {
            let final_leaderboard = Self::leaderboard(&state);
            Self::emit(&mut state, |seq| LiveMessage::SessionEnded {
                final_leaderboard: final_leaderboard.clone(),
                seq,
            });
        }
        Self::persist(&state, self.id).await;
        Ok(target)
    }

    /// Activate a question round. Idempotent while the same question's
    /// round is open: the existing round is returned and no second
    /// `QuestionActivated` event (or fresh activation timestamp) is
    /// produced.
    pub async fn activate_question(
        self: &Arc<Self>,
        presenter_token: &str,
        question_id: Uuid,
    ) -> LiveResult<ActiveRound> {
        let mut state = self.state.lock().await;
        Self::check_presenter(&state, presenter_token)?;
        Self::activate_locked(self, &mut state, question_id).await
    }

    async fn activate_locked(
        self_arc: &Arc<Self>,
        state: &mut SessionState,
        question_id: Uuid,
    ) -> LiveResult<ActiveRound> {
        if state.status != SessionStatus::Running {
            return Err(LiveError::new(
                ErrorCode::InvalidTransition,
                format!("session is {:?}, not running", state.status),
            ));
        }
        if let Some(round) = &state.current_round {
            if !round.closed {
                if round.question.id == question_id {
                    return Ok(round.to_active());
                }
                return Err(LiveError::new(
                    ErrorCode::InvalidTransition,
                    "another round is still open",
                ));
            }
        }
        let question = state
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
            .ok_or_else(|| LiveError::new(ErrorCode::NotFound, "question not in this session"))?;

        state.round_generation += 1;
        let round = RoundState::new(question, state.round_generation, Utc::now());
        let active = round.to_active();
        let generation = round.generation;
        let time_limit = Duration::from_millis(round.question.time_limit_ms);
        state.current_round = Some(round);
        state.last_activity = Utc::now();

        if let Some(previous) = state.timer.take() {
            previous.abort();
        }
        let handle = Arc::clone(self_arc);
        let round_id = active.round_id;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(time_limit).await;
            handle.close_round(round_id, generation, CloseReason::Timeout).await;
        });
        state.timer = Some(timer.abort_handle());

        info!(session_id = %self_arc.id, round_id = %active.round_id, question_id = %question_id, "round activated");
        let event = active.clone();
        Self::emit(state, |seq| LiveMessage::QuestionActivated {
            round_id: event.round_id,
            question_id: event.question_id,
            kind: event.kind,
            prompt: event.prompt.clone(),
            options: event.options.clone(),
            point_value: event.point_value,
            time_limit_ms: event.time_limit_ms,
            activated_at: event.activated_at,
            seq,
        });
        Self::persist(state, self_arc.id).await;
        Ok(active)
    }

    /// Close the round, exactly once. A stale round id or generation is a
    /// no-op, which resolves the timer-vs-last-response race to a single
    /// close.
    async fn close_round(self: &Arc<Self>, round_id: Uuid, generation: u64, reason: CloseReason) {
        let mut state = self.state.lock().await;
        Self::close_round_locked(self, &mut state, round_id, generation, reason);
    }

    fn close_round_locked(
        self_arc: &Arc<Self>,
        state: &mut SessionState,
        round_id: Uuid,
        generation: u64,
        reason: CloseReason,
    ) {
        let Some(round) = state.current_round.as_mut() else { return };
        if round.round_id != round_id || round.generation != generation || round.closed {
            return;
        }
        round.closed = true;
        let question = round.question.clone();
        let word_cloud = matches!(question.kind, QuestionKind::WordCloud)
            .then(|| round.word_cloud());
        if reason == CloseReason::AllResponded {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
        info!(session_id = %self_arc.id, round_id = %round_id, reason = ?reason, "round closed");

        let correct_answer = (!matches!(question.answer, AnswerSpec::None))
            .then(|| question.answer.clone());
        Self::emit(state, |seq| LiveMessage::RoundClosed {
            round_id,
            correct_answer: correct_answer.clone(),
            word_cloud: word_cloud.clone(),
            seq,
        });

        if state.auto_advance {
            let next = state
                .questions
                .iter()
                .position(|q| q.id == question.id)
                .and_then(|idx| state.questions.get(idx + 1))
                .map(|q| q.id);
            if let Some(next_question) = next {
                let handle = Arc::clone(self_arc);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(AUTO_ADVANCE_COOLDOWN_MS)).await;
                    let mut state = handle.state.lock().await;
                    if let Err(error) =
                        Self::activate_locked(&handle, &mut state, next_question).await
                    {
                        debug!(session_id = %handle.id, error = %error, "auto-advance skipped");
                    }
                });
            }
        }
    }

    /// Validate and score one response. Feedback goes to the submitter
    /// only; the refreshed leaderboard goes to the whole group.
    pub async fn submit_response(
        self: &Arc<Self>,
        participant_id: Uuid,
        round_id: Uuid,
        payload: ResponsePayload,
    ) -> LiveResult<()> {
        let mut state = self.state.lock().await;
        if !state.participants.contains_key(&participant_id) {
            return Err(LiveError::new(ErrorCode::NotFound, "unknown participant"));
        }
        let matcher = Arc::clone(&state.matcher);
        let now = Utc::now();

        let (record, question, elapsed_ms) = {
            let Some(round) = state.current_round.as_ref() else {
                return Err(LiveError::from_code(ErrorCode::RoundClosed));
            };
            if round.round_id != round_id || round.closed {
                return Err(LiveError::from_code(ErrorCode::RoundClosed));
            }
            if round.has_response(participant_id) {
                return Err(LiveError::from_code(ErrorCode::AlreadySubmitted));
            }

            let question = round.question.clone();
            let is_correct = scoring::evaluate(&question, &payload, matcher.as_ref())?;
            let elapsed_ms = round.elapsed_ms(now);
            let effective_value = match question.kind {
                QuestionKind::WordCloud => 0,
                _ => question.point_value,
            };
            let points =
                scoring::award_points(is_correct, effective_value, elapsed_ms, question.time_limit_ms);
            (
                ResponseRecord {
                    participant_id,
                    round_id,
                    payload: payload.clone(),
                    received_at: now,
                    is_correct,
                    points,
                },
                question,
                elapsed_ms,
            )
        };

        {
            let round = state.current_round.as_mut().expect("round checked above");
            if question.kind == QuestionKind::WordCloud {
                if let ResponsePayload::Text { text } = &payload {
                    round.tally_word(scoring::normalize_answer(text));
                }
            }
            round.record(record.clone());
        }

        let participant = state.participants.get_mut(&participant_id).expect("checked above");
        participant.score += record.points;
        participant.scored_count += 1;
        participant.total_latency_ms += elapsed_ms;
        if record.is_correct {
            participant.correct_count += 1;
            participant.correct_latency_ms += elapsed_ms;
            participant.first_correct_at.get_or_insert(now);
        }
        state.last_activity = now;

        state
            .store
            .append_response(PersistedResponse {
                session_id: self.id,
                round_id,
                participant_id,
                payload,
                received_at: now,
                is_correct: record.is_correct,
                points: record.points,
            })
            .await;

        let correct_answer =
            (!matches!(question.answer, AnswerSpec::None)).then(|| question.answer.clone());
        if !state.group.send_to(
            participant_id,
            LiveMessage::AnswerFeedback {
                round_id,
                is_correct: record.is_correct,
                points_awarded: record.points,
                correct_answer,
            },
        ) {
            warn!(session_id = %self.id, participant_id = %participant_id, "feedback receiver gone");
        }

        let entries = Self::leaderboard(&state);
        Self::emit(&mut state, |seq| LiveMessage::LeaderboardUpdated {
            entries: entries.clone(),
            seq,
        });

        Self::maybe_close_all_responded(self, &mut state);
        Ok(())
    }

    /// Close the round early when every currently-connected participant
    /// has a recorded response. Disconnected participants do not hold the
    /// round open.
    fn maybe_close_all_responded(self_arc: &Arc<Self>, state: &mut SessionState) {
        let Some(round) = state.current_round.as_ref() else { return };
        if round.closed || round.response_count() == 0 {
            return;
        }
        let connected: Vec<Uuid> = state
            .participants
            .values()
            .filter(|p| p.connected)
            .map(|p| p.id)
            .collect();
        if connected.is_empty() || !connected.iter().all(|id| round.has_response(*id)) {
            return;
        }
        let (round_id, generation) = (round.round_id, round.generation);
        Self::close_round_locked(self_arc, state, round_id, generation, CloseReason::AllResponded);
    }

    /// Presenter viewport for follow-along mode.
    pub async fn update_focus(&self, presenter_token: &str, viewport: MapViewport) -> LiveResult<()> {
        let mut state = self.state.lock().await;
        Self::check_presenter(&state, presenter_token)?;
        state.last_focus = Some(viewport);
        state.last_activity = Utc::now();
        Self::emit(&mut state, |seq| LiveMessage::TeacherFocusChanged {
            lat: viewport.lat,
            lng: viewport.lng,
            zoom: viewport.zoom,
            seq,
        });
        Ok(())
    }

    /// Explicit leave: the participant is removed outright.
    pub async fn leave(self: &Arc<Self>, participant_id: Uuid) -> LiveResult<()> {
        let mut state = self.state.lock().await;
        if state.participants.remove(&participant_id).is_none() {
            return Err(LiveError::new(ErrorCode::NotFound, "unknown participant"));
        }
        state.group.unregister_member(participant_id);
        state.last_activity = Utc::now();
        Self::broadcast_roster(&mut state);
        Self::maybe_close_all_responded(self, &mut state);
        Ok(())
    }

    /// Connection dropped without a leave: keep the participant and their
    /// score, mark them disconnected. The round closes normally based on
    /// the remaining connected participants.
    pub async fn mark_participant_disconnected(self: &Arc<Self>, participant_id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(participant) = state.participants.get_mut(&participant_id) {
            participant.connected = false;
        }
        state.group.unregister_member(participant_id);
        Self::broadcast_roster(&mut state);
        Self::maybe_close_all_responded(self, &mut state);
    }

    pub async fn mark_presenter_disconnected(&self) {
        let mut state = self.state.lock().await;
        state.group.unregister_presenter();
    }

    /// Full self-describing state for late joiners and reconnects.
    pub async fn snapshot(&self) -> LiveMessage {
        let state = self.state.lock().await;
        let round = state
            .current_round
            .as_ref()
            .filter(|round| !round.closed)
            .map(RoundState::to_active);
        LiveMessage::StateSnapshot {
            session_id: self.id,
            status: state.status,
            seq: state.seq,
            round,
            leaderboard: Self::leaderboard(&state),
        }
    }

    /// Idle means no live connections and no activity past the TTL;
    /// the registry sweeper drops such sessions.
    pub async fn is_idle(&self, ttl: chrono::Duration) -> bool {
        let state = self.state.lock().await;
        state.group.is_empty() && Utc::now() - state.last_activity > ttl
    }

    pub async fn abort_timer(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    fn check_presenter(state: &SessionState, presenter_token: &str) -> LiveResult<()> {
        if state.presenter_token != presenter_token {
            return Err(LiveError::new(ErrorCode::Forbidden, "presenter token mismatch"));
        }
        Ok(())
    }

    fn emit(state: &mut SessionState, build: impl FnOnce(u64) -> LiveMessage) {
        state.seq += 1;
        let message = build(state.seq);
        state.group.broadcast(&message);
    }

    fn broadcast_roster(state: &mut SessionState) {
        let mut participants: Vec<ParticipantInfo> =
            state.participants.values().map(Participant::info).collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Self::emit(state, |seq| LiveMessage::ParticipantRoster {
            participants: participants.clone(),
            seq,
        });
    }

    fn leaderboard(state: &SessionState) -> Vec<LeaderboardEntry> {
        leaderboard::compute(state.participants.values().map(Participant::rank_input).collect())
    }

    async fn persist(state: &SessionState, session_id: Uuid) {
        state
            .store
            .save_session(PersistedSession {
                id: session_id,
                code: state.code.clone(),
                presenter_id: state.presenter_id,
                status: state.status,
                question_ids: state.questions.iter().map(|q| q.id).collect(),
                current_round_index: state.current_round.as_ref().and_then(|round| {
                    state.questions.iter().position(|q| q.id == round.question.id)
                }),
                created_at: state.created_at,
                started_at: state.started_at,
                ended_at: state.ended_at,
            })
            .await;
    }
}
