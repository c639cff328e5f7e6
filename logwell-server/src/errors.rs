use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use logwell_core::CoreError;
use logwell_model::SelectorError;
use serde_json::json;
use std::fmt;

pub type ApiResult<T> = Result<T, ApiError>;

/// API-facing error: an HTTP status, a stable kind code and a message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn bad_query(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_QUERY", message)
    }

    pub fn invalid_regex(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REGEX", message)
    }

    pub fn invalid_time_range(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_TIME_RANGE", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn ingestion_backpressure(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "INGESTION_ERROR", message)
    }

    pub fn ingestion_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "INGESTION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "code": self.code,
        });
        if let Some(details) = self.details {
            body["details"] = json!(details);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Selector(SelectorError::Syntax(_)) => Self::bad_query(err.to_string()),
            CoreError::Selector(SelectorError::Regex(_)) => {
                Self::invalid_regex(err.to_string())
            }
            CoreError::TimeRange(_) => Self::invalid_time_range(err.to_string()),
            CoreError::Validation(_) | CoreError::Labels(_) => {
                Self::validation(err.to_string())
            }
            CoreError::BufferFull => {
                Self::ingestion_backpressure("ingest buffer full, retry later")
            }
            CoreError::ShuttingDown => Self::ingestion_unavailable("server is shutting down"),
            CoreError::Io(_)
            | CoreError::Serialization(_)
            | CoreError::Corrupt(_)
            | CoreError::Internal(_) => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_spec_codes() {
        let cases = [
            (
                CoreError::Selector(SelectorError::Syntax("x".into())),
                StatusCode::BAD_REQUEST,
                "BAD_QUERY",
            ),
            (
                CoreError::Selector(SelectorError::Regex("x".into())),
                StatusCode::BAD_REQUEST,
                "INVALID_REGEX",
            ),
            (
                CoreError::TimeRange("x".into()),
                StatusCode::BAD_REQUEST,
                "INVALID_TIME_RANGE",
            ),
            (
                CoreError::Validation("x".into()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                CoreError::BufferFull,
                StatusCode::TOO_MANY_REQUESTS,
                "INGESTION_ERROR",
            ),
            (
                CoreError::ShuttingDown,
                StatusCode::SERVICE_UNAVAILABLE,
                "INGESTION_ERROR",
            ),
            (
                CoreError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }
}
