//! API error taxonomy and the JSON response envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Errors surfaced to API clients.
///
/// Everything that reaches a handler boundary collapses into one of
/// these, which fixes the status code and the envelope shape.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input: bad id, invalid graph, unparsable cron.
    Validation { message: String },
    /// The referenced resource does not exist.
    NotFound { resource: &'static str, id: String },
    /// The caller does not own the referenced resource.
    AccessDenied { message: String },
    /// A storage or downstream failure the client cannot fix.
    Internal { message: String },
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "{message}"),
            Self::NotFound { resource, id } => write!(f, "{resource} {id} not found"),
            Self::AccessDenied { message } => write!(f, "{message}"),
            Self::Internal { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal {
            message: format!("database error: {err}"),
        }
    }
}

impl From<nusoma_execution::StorageError> for ApiError {
    fn from(err: nusoma_execution::StorageError) -> Self {
        Self::Internal {
            message: format!("{}: {err}", err.code()),
        }
    }
}

impl From<nusoma_queue::QueueError> for ApiError {
    fn from(err: nusoma_queue::QueueError) -> Self {
        Self::Internal {
            message: format!("queue error: {err}"),
        }
    }
}

impl From<nusoma_scheduler::ScheduleError> for ApiError {
    fn from(err: nusoma_scheduler::ScheduleError) -> Self {
        Self::Validation {
            message: format!("schedule error: {err}"),
        }
    }
}

impl From<nusoma_graph::GraphError> for ApiError {
    fn from(err: nusoma_graph::GraphError) -> Self {
        Self::Validation {
            message: format!("invalid graph: {err}"),
        }
    }
}

/// Wraps response data in the `{"success": true, "data": ...}` envelope.
pub fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}
