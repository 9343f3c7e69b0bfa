// HTTP + WebSocket surface of the live session engine.

pub mod handler;
pub mod protocol;

use crate::error::EngineError;
use crate::registry::SessionRegistry;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use maplive_common::error::ErrorCode;
use maplive_common::types::{QuestionDef, SessionStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub(crate) const HEARTBEAT_INTERVAL_MS: u32 = 15_000;
pub(crate) const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
pub(crate) const MAX_FRAME_BYTES: u32 = 65_536;

#[derive(Clone)]
pub struct EngineRouterState {
    pub registry: Arc<SessionRegistry>,
    pub ws_base_url: Arc<str>,
}

pub fn router(registry: Arc<SessionRegistry>, ws_base_url: String) -> Router {
    let state = EngineRouterState { registry, ws_base_url: Arc::<str>::from(ws_base_url) };
    Router::new()
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/{code}", get(lookup_session))
        .route("/v1/ws/{session_id}", get(handler::ws_upgrade))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// The presenter as known to the surrounding platform; generated when
    /// absent.
    #[serde(default)]
    pub presenter_id: Option<Uuid>,
    #[serde(default)]
    pub auto_advance: bool,
    pub questions: Vec<QuestionDef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub code: String,
    pub presenter_id: Uuid,
    pub presenter_token: String,
    pub ws_url: String,
    pub heartbeat_interval_ms: u32,
    pub max_frame_bytes: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LookupSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub ws_url: String,
}

async fn create_session(
    State(state): State<EngineRouterState>,
    Json(payload): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    match state
        .registry
        .create_session(payload.presenter_id, payload.questions, payload.auto_advance)
        .await
    {
        Ok(created) => (
            StatusCode::CREATED,
            Json(CreateSessionResponse {
                session_id: created.session_id,
                code: created.code,
                presenter_id: created.presenter_id,
                presenter_token: created.presenter_token,
                ws_url: format!("{}/v1/ws/{}", state.ws_base_url, created.session_id),
                heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
                max_frame_bytes: MAX_FRAME_BYTES,
            }),
        )
            .into_response(),
        Err(error) => EngineError::from(error).into_response(),
    }
}

async fn lookup_session(
    Path(code): Path<String>,
    State(state): State<EngineRouterState>,
) -> impl IntoResponse {
    let Some(session) = state.registry.find_by_code(&code).await else {
        return EngineError::from_code(ErrorCode::NotFound).into_response();
    };
    let response = LookupSessionResponse {
        session_id: session.id,
        status: session.status().await,
        ws_url: format!("{}/v1/ws/{}", state.ws_base_url, session.id),
    };
    Json(response).into_response()
}
