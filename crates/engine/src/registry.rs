// Session registry: the one shared lookup table across live sessions.
//
// Lookup by id or human-enterable join code. Sessions themselves are
// serialized behind their own handle; the registry only guards the maps.

use crate::session::SessionHandle;
use crate::store::SessionStore;
use maplive_common::error::{ErrorCode, LiveError, LiveResult};
use maplive_common::types::QuestionDef;
use rand::Rng;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

const JOIN_CODE_LEN: usize = 6;
const JOIN_CODE_ATTEMPTS: usize = 32;

/// What a presenter gets back from session creation.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub code: String,
    pub presenter_id: Uuid,
    pub presenter_token: String,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
    codes: RwLock<HashMap<String, Uuid>>,
    store: SessionStore,
}

impl SessionRegistry {
    pub fn new(store: SessionStore) -> Self {
        Self { sessions: RwLock::default(), codes: RwLock::default(), store }
    }

    /// Create a session with a fresh join code and presenter token.
    pub async fn create_session(
        &self,
        presenter_id: Option<Uuid>,
        questions: Vec<QuestionDef>,
        auto_advance: bool,
    ) -> LiveResult<CreatedSession> {
        if questions.is_empty() {
            return Err(LiveError::new(
                ErrorCode::ValidationFailed,
                "a session needs at least one question",
            ));
        }
        let presenter_id = presenter_id.unwrap_or_else(Uuid::new_v4);
        let presenter_token = Uuid::new_v4().to_string();

        // Reserve and claim the code under one write guard so two
        // concurrent creates cannot pick the same one.
        let (handle, code) = {
            let mut codes = self.codes.write().await;
            let code = reserve_code(&codes)?;
            let handle = SessionHandle::new(
                code.clone(),
                presenter_id,
                presenter_token.clone(),
                questions.clone(),
                auto_advance,
                self.store.clone(),
            );
            codes.insert(code.clone(), handle.id);
            (handle, code)
        };
        let session_id = handle.id;
        self.store.save_questions(session_id, questions).await;
        self.sessions.write().await.insert(session_id, handle);
        info!(session_id = %session_id, code = %code, "session created");

        Ok(CreatedSession { session_id, code, presenter_id, presenter_token })
    }

    pub async fn find(&self, session_id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn find_by_code(&self, code: &str) -> Option<Arc<SessionHandle>> {
        let session_id = *self.codes.read().await.get(code.trim())?;
        self.find(session_id).await
    }

    /// Drop a session from the registry, cancelling its round timer.
    pub async fn terminate(&self, session_id: Uuid) -> LiveResult<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(&session_id)
            .ok_or_else(|| LiveError::from_code(ErrorCode::NotFound))?;
        handle.abort_timer().await;
        let code = handle.code().await;
        self.codes.write().await.remove(&code);
        // Response history is append-only and stays; the session row and
        // question set go with the handle.
        self.store.remove_session(session_id).await;
        info!(session_id = %session_id, "session terminated");
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// One sweep pass: drop sessions idle past `ttl`.
    pub async fn sweep_idle(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1));
        let candidates: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().cloned().collect();

        let mut swept = 0;
        for handle in candidates {
            if handle.is_idle(ttl).await {
                if self.terminate(handle.id).await.is_ok() {
                    warn!(session_id = %handle.id, "idle session swept");
                    swept += 1;
                }
            }
        }
        swept
    }

    /// Background sweeper; runs until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, ttl: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                registry.sweep_idle(ttl).await;
            }
        });
    }

}

fn reserve_code(codes: &HashMap<String, Uuid>) -> LiveResult<String> {
    for _ in 0..JOIN_CODE_ATTEMPTS {
        let code = generate_join_code();
        if !codes.contains_key(&code) {
            return Ok(code);
        }
    }
    Err(LiveError::new(ErrorCode::InternalError, "could not allocate a unique join code"))
}

fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..JOIN_CODE_LEN).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplive_common::types::{AnswerSpec, QuestionKind};

    fn one_question() -> Vec<QuestionDef> {
        vec![QuestionDef {
            id: Uuid::new_v4(),
            kind: QuestionKind::TrueFalse,
            prompt: "Is this a map?".into(),
            options: Vec::new(),
            answer: AnswerSpec::Options { correct: vec![Uuid::new_v4()] },
            point_value: 100,
            time_limit_ms: 10_000,
        }]
    }

    #[tokio::test]
    async fn create_then_find_by_code_and_id() {
        let registry = SessionRegistry::default();
        let created = registry.create_session(None, one_question(), false).await.unwrap();
        assert_eq!(created.code.len(), JOIN_CODE_LEN);
        assert!(created.code.chars().all(|c| c.is_ascii_digit()));

        let by_id = registry.find(created.session_id).await.unwrap();
        let by_code = registry.find_by_code(&created.code).await.unwrap();
        assert_eq!(by_id.id, by_code.id);
    }

    #[tokio::test]
    async fn find_by_code_trims_input() {
        let registry = SessionRegistry::default();
        let created = registry.create_session(None, one_question(), false).await.unwrap();
        assert!(registry.find_by_code(&format!("  {}  ", created.code)).await.is_some());
    }

    #[tokio::test]
    async fn empty_question_list_is_rejected() {
        let registry = SessionRegistry::default();
        let err = registry.create_session(None, Vec::new(), false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn terminate_removes_both_indexes() {
        let registry = SessionRegistry::default();
        let created = registry.create_session(None, one_question(), false).await.unwrap();
        registry.terminate(created.session_id).await.unwrap();
        assert!(registry.find(created.session_id).await.is_none());
        assert!(registry.find_by_code(&created.code).await.is_none());
        assert_eq!(
            registry.terminate(created.session_id).await.unwrap_err().code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn concurrent_creates_allocate_distinct_codes() {
        let registry = Arc::new(SessionRegistry::default());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.create_session(None, one_question(), false).await.unwrap()
            }));
        }

        let mut codes = std::collections::HashSet::new();
        for task in tasks {
            let created = task.await.unwrap();
            assert!(codes.insert(created.code.clone()), "duplicate code {}", created.code);
            let found = registry.find_by_code(&created.code).await.unwrap();
            assert_eq!(found.id, created.session_id);
        }
    }

    #[tokio::test]
    async fn sweep_drops_only_idle_sessions() {
        let registry = SessionRegistry::default();
        let created = registry.create_session(None, one_question(), false).await.unwrap();
        // Fresh session: last activity is now, so a 1h TTL keeps it.
        assert_eq!(registry.sweep_idle(Duration::from_secs(3600)).await, 0);
        assert!(registry.find(created.session_id).await.is_some());
    }
}
