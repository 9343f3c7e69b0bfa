// Persistence collaborators for sessions, questions, and responses.
//
// Durable storage is outside the engine's scope; the engine only calls
// through this store. The in-memory arm is the shipped implementation; a
// database-backed arm slots in as another variant the way the engine is
// written against it.

use chrono::{DateTime, Utc};
use maplive_common::types::{QuestionDef, ResponsePayload, SessionStatus};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable view of a session, written on every lifecycle change.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub id: Uuid,
    pub code: String,
    pub presenter_id: Uuid,
    pub status: SessionStatus,
    pub question_ids: Vec<Uuid>,
    pub current_round_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Durable view of one accepted response (append-only).
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedResponse {
    pub session_id: Uuid,
    pub round_id: Uuid,
    pub participant_id: Uuid,
    pub payload: ResponsePayload,
    pub received_at: DateTime<Utc>,
    pub is_correct: bool,
    pub points: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: HashMap<Uuid, PersistedSession>,
    questions: HashMap<Uuid, Vec<QuestionDef>>,
    responses: Vec<PersistedResponse>,
}

#[derive(Debug, Clone)]
pub enum SessionStore {
    Memory(Arc<RwLock<MemoryStore>>),
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::Memory(Arc::default())
    }
}

impl SessionStore {
    pub async fn save_session(&self, session: PersistedSession) {
        match self {
            Self::Memory(store) => {
                store.write().await.sessions.insert(session.id, session);
            }
        }
    }

    pub async fn load_session(&self, session_id: Uuid) -> Option<PersistedSession> {
        match self {
            Self::Memory(store) => store.read().await.sessions.get(&session_id).cloned(),
        }
    }

    pub async fn save_questions(&self, session_id: Uuid, questions: Vec<QuestionDef>) {
        match self {
            Self::Memory(store) => {
                store.write().await.questions.insert(session_id, questions);
            }
        }
    }

    pub async fn load_questions(&self, session_id: Uuid) -> Vec<QuestionDef> {
        match self {
            Self::Memory(store) => {
                store.read().await.questions.get(&session_id).cloned().unwrap_or_default()
            }
        }
    }

    pub async fn append_response(&self, response: PersistedResponse) {
        match self {
            Self::Memory(store) => store.write().await.responses.push(response),
        }
    }

    pub async fn responses_for_session(&self, session_id: Uuid) -> Vec<PersistedResponse> {
        match self {
            Self::Memory(store) => store
                .read()
                .await
                .responses
                .iter()
                .filter(|r| r.session_id == session_id)
                .cloned()
                .collect(),
        }
    }

    pub async fn remove_session(&self, session_id: Uuid) {
        match self {
            Self::Memory(store) => {
                let mut guard = store.write().await;
                guard.sessions.remove(&session_id);
                guard.questions.remove(&session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(id: Uuid) -> PersistedSession {
        PersistedSession {
            id,
            code: "123456".into(),
            presenter_id: Uuid::new_v4(),
            status: SessionStatus::Pending,
            question_ids: Vec::new(),
            current_round_index: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = SessionStore::default();
        let id = Uuid::new_v4();
        store.save_session(persisted(id)).await;
        let loaded = store.load_session(id).await.unwrap();
        assert_eq!(loaded.code, "123456");
    }

    #[tokio::test]
    async fn responses_filtered_by_session() {
        let store = SessionStore::default();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();
        for (session_id, points) in [(session_a, 100), (session_b, 200), (session_a, 300)] {
            store
                .append_response(PersistedResponse {
                    session_id,
                    round_id: Uuid::new_v4(),
                    participant_id: Uuid::new_v4(),
                    payload: ResponsePayload::Text { text: "x".into() },
                    received_at: Utc::now(),
                    is_correct: true,
                    points,
                })
                .await;
        }
        let for_a = store.responses_for_session(session_a).await;
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a.iter().map(|r| r.points).sum::<u64>(), 400);
    }

    #[tokio::test]
    async fn remove_drops_session_and_questions() {
        let store = SessionStore::default();
        let id = Uuid::new_v4();
        store.save_session(persisted(id)).await;
        store.save_questions(id, Vec::new()).await;
        store.remove_session(id).await;
        assert!(store.load_session(id).await.is_none());
    }
}
