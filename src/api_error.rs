//! Typed request errors and their translation into JSON responses.
//!
//! [`ApiError`] is the single error type handlers and guards return to a
//! client. Its [`IntoResponse`] implementation is the centralized
//! translator: every variant maps to one `{status_code, error_code}` pair
//! and renders as an [`ErrorBody`]:
//!
//! ```json
//! {"error": true, "message": "...", "error_code": "...", "details": {}, "timestamp": "..."}
//! ```

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Details = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, details: Details },

    #[error("{message}")]
    RateLimit {
        message: String,
        retry_after: u64,
        details: Details,
    },

    #[error("Request timeout")]
    RequestTimeout { timeout_seconds: u64 },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{message}")]
    Authentication { message: String },

    #[error("{message}")]
    Authorization { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Database operation failed")]
    Database {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{service}: {message}")]
    ExternalService { service: String, message: String },

    #[error("Internal server error")]
    Internal {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>, details: Details) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::RequestTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::RateLimit { .. } => "RATE_LIMIT_ERROR",
            Self::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_ERROR",
            Self::Conflict { .. } => "CONFLICT_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Details safe to show a client. Storage and internal failures never
    /// expose their source.
    fn public_details(&self) -> Details {
        match self {
            Self::Validation { details, .. } => details.clone(),
            Self::RateLimit {
                details,
                retry_after,
                ..
            } => {
                let mut details = details.clone();
                details.insert("retry_after".into(), Value::from(*retry_after));
                details
            }
            Self::RequestTimeout { timeout_seconds } => {
                let mut details = Details::new();
                details.insert("timeout_seconds".into(), Value::from(*timeout_seconds));
                details
            }
            Self::ExternalService { service, .. } => {
                let mut details = Details::new();
                details.insert("service".into(), Value::from(service.as_str()));
                details
            }
            _ => Details::new(),
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
    pub error_code: String,
    pub details: Value,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, error_code: &str, details: Details) -> Self {
        Self {
            error: true,
            message: message.into(),
            error_code: error_code.to_string(),
            details: Value::Object(details),
            timestamp: utc_timestamp(),
        }
    }
}

/// Current UTC time as RFC 3339 with a `Z` suffix.
#[must_use]
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_code = self.error_code(), error = ?self, "request failed");
        } else {
            tracing::debug!(error_code = self.error_code(), error = %self, "request rejected");
        }

        let body = ErrorBody::new(self.to_string(), self.error_code(), self.public_details());
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimit { retry_after, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response) -> ErrorBody {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rate_limit_sets_retry_after_header_and_detail() {
        let err = ApiError::RateLimit {
            message: "Rate limit exceeded".into(),
            retry_after: 42,
            details: Details::new(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let body = body_of(response).await;
        assert!(body.error);
        assert_eq!(body.error_code, "RATE_LIMIT_ERROR");
        assert_eq!(body.details["retry_after"], 42);
        assert!(body.timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn database_errors_do_not_leak_source() {
        let err = ApiError::Database {
            source: "connection refused to 10.0.0.5:5432".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(response).await;
        assert_eq!(body.error_code, "DATABASE_ERROR");
        assert_eq!(body.message, "Database operation failed");
        assert_eq!(body.details, Value::Object(Details::new()));
    }

    #[tokio::test]
    async fn timeout_renders_408_with_deadline() {
        let response = ApiError::RequestTimeout { timeout_seconds: 30 }.into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let body = body_of(response).await;
        assert_eq!(body.error_code, "REQUEST_TIMEOUT");
        assert_eq!(body.message, "Request timeout");
        assert_eq!(body.details["timeout_seconds"], 30);
    }

    #[test]
    fn status_and_code_pairs() {
        let not_found = ApiError::NotFound {
            resource: "Sample".into(),
        };
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "Sample not found");

        let denied = ApiError::Authorization {
            message: "Access denied".into(),
        };
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(denied.error_code(), "AUTHORIZATION_ERROR");
    }
}
