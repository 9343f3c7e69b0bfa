use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use maplive_common::error::{ErrorCode, LiveError};
use serde_json::json;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// HTTP rendering of a [`LiveError`].
#[derive(Debug, Clone)]
pub struct EngineError {
    inner: LiveError,
    request_id: Option<String>,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { inner: LiveError::new(code, message), request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self { inner: LiveError::from_code(code), request_id: None }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.inner.code
    }
}

impl From<LiveError> for EngineError {
    fn from(inner: LiveError) -> Self {
        Self { inner, request_id: None }
    }
}

pub const fn status_for_code(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidTransition => StatusCode::CONFLICT,
        ErrorCode::RoundClosed => StatusCode::CONFLICT,
        ErrorCode::AlreadySubmitted => StatusCode::CONFLICT,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::TransportUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.or_else(current_request_id);

        let mut response = (
            status_for_code(self.inner.code),
            Json(json!({
                "error": {
                    "code": self.inner.code.as_str(),
                    "message": self.inner.message,
                    "retryable": self.inner.code.retryable(),
                    "request_id": request_id.clone(),
                }
            })),
        )
            .into_response();

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use maplive_common::error::ErrorCode;
    use serde_json::Value;

    use super::{status_for_code, with_request_id_scope, EngineError};

    #[tokio::test]
    async fn engine_error_uses_scoped_request_id() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            EngineError::from_code(ErrorCode::InternalError).into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        let parsed: Value =
            serde_json::from_slice(&body).expect("error response body should be valid json");

        assert_eq!(parsed["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(parsed["error"]["retryable"], true);
        assert_eq!(parsed["error"]["request_id"], "req-scoped-123");
    }

    #[test]
    fn taxonomy_maps_to_conflict_for_round_races() {
        assert_eq!(status_for_code(ErrorCode::RoundClosed), StatusCode::CONFLICT);
        assert_eq!(status_for_code(ErrorCode::AlreadySubmitted), StatusCode::CONFLICT);
        assert_eq!(status_for_code(ErrorCode::InvalidTransition), StatusCode::CONFLICT);
        assert_eq!(status_for_code(ErrorCode::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for_code(ErrorCode::TransportUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn explicit_request_id_overrides_scope() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            EngineError::from_code(ErrorCode::Forbidden)
                .with_request_id("req-explicit-456")
                .into_response()
        })
        .await;

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        let parsed: Value =
            serde_json::from_slice(&body).expect("error response body should be valid json");
        assert_eq!(parsed["error"]["request_id"], "req-explicit-456");
    }
}
