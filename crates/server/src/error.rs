//! Maps [`memos_runtime::RuntimeError`] onto HTTP status codes.
//!
//! `spec.md` §7 splits failures into configuration (fatal at startup, never
//! reaches here), protocol/policy/tool-execution (handled inside the step
//! loop, never surfaced), transient I/O (propagate as a 5xx), and user input
//! (404/400). This is the last of those four.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use memos_runtime::RuntimeError;
use serde_json::json;

pub struct ApiError(RuntimeError);

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            RuntimeError::UnknownConversation(_) | RuntimeError::UnknownPersona(_) => {
                (StatusCode::NOT_FOUND, self.0.to_string())
            }
            RuntimeError::Persistence(err) => match err {
                memos_persistence::PersistenceError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, self.0.to_string())
                }
                memos_persistence::PersistenceError::AlreadyExists(_) => {
                    (StatusCode::BAD_REQUEST, self.0.to_string())
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()),
            },
            RuntimeError::Tokenizer(_) | RuntimeError::Memory(_) | RuntimeError::Step(_) | RuntimeError::Io { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
