//! Request payload size and content-type enforcement.
//!
//! A declared `Content-Length` over the limit is rejected before any body
//! byte is read. For methods that may carry a body the body is then read
//! once through [`Limited`]: the read stops as soon as `max_payload_bytes`
//! is crossed, so an undeclared (chunked) oversized body never costs more
//! than `max_payload_bytes` of memory. The same buffered bytes feed the
//! content-type check and are re-attached to the request for the handler.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use axum::BoxError;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::json;

use super::access_log;
use super::audit::SecurityEventKind;
use super::client_identity::client_key_of;
use super::Gatekeeper;
use crate::api_error::{ApiError, Details};
use crate::config::model::{PayloadConfig, MIB};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadRejection {
    TooLarge {
        /// Declared length. For an undeclared body the read stops at the
        /// limit, so this is the lower bound `max_bytes + 1`.
        size_bytes: u64,
        max_bytes: u64,
    },
    UnsupportedContentType {
        content_type: String,
        allowed: Vec<String>,
    },
    UnreadableBody {
        reason: String,
    },
}

impl PayloadRejection {
    const fn event_kind(&self) -> Option<SecurityEventKind> {
        match self {
            Self::TooLarge { .. } => Some(SecurityEventKind::OversizedRequest),
            Self::UnsupportedContentType { .. } => Some(SecurityEventKind::InvalidContentType),
            Self::UnreadableBody { .. } => None,
        }
    }
}

impl From<PayloadRejection> for ApiError {
    fn from(rejection: PayloadRejection) -> Self {
        let mut details = Details::new();
        match rejection {
            PayloadRejection::TooLarge {
                size_bytes,
                max_bytes,
            } => {
                details.insert("size_bytes".into(), json!(size_bytes));
                details.insert("max_size_bytes".into(), json!(max_bytes));
                details.insert("max_size_mb".into(), json!(max_bytes / MIB));
                Self::validation(format!("Request payload too large: {size_bytes} bytes"), details)
            }
            PayloadRejection::UnsupportedContentType {
                content_type,
                allowed,
            } => {
                let message = format!("Invalid Content-Type: {content_type}");
                details.insert("content_type".into(), json!(content_type));
                details.insert("allowed_types".into(), json!(allowed));
                Self::validation(message, details)
            }
            PayloadRejection::UnreadableBody { reason } => {
                details.insert("reason".into(), json!(reason));
                Self::validation("Request body could not be read", details)
            }
        }
    }
}

/// Request body as buffered by the payload guard, left in the request
/// extensions for later stages.
#[derive(Debug, Clone)]
pub struct BufferedBody(pub Bytes);

#[derive(Debug)]
pub enum PayloadVerdict {
    Accepted(Request),
    Rejected(PayloadRejection),
}

enum BoundedRead {
    Complete(Bytes),
    Exceeded,
}

/// Collect `body`, giving up as soon as more than `limit` bytes arrive.
async fn read_bounded(body: Body, limit: u64) -> Result<BoundedRead, BoxError> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(BoundedRead::Complete(collected.to_bytes())),
        Err(e) if e.is::<LengthLimitError>() => Ok(BoundedRead::Exceeded),
        Err(e) => Err(e),
    }
}

/// Declared body length. An unparsable header is logged and ignored.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(header::CONTENT_LENGTH)?;
    let parsed = raw.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok());
    if parsed.is_none() {
        tracing::warn!(content_length = ?raw, "invalid Content-Length header");
    }
    parsed
}

/// Lower-cased `Content-Type` as sent, and its MIME type without parameters.
fn content_type_of(headers: &HeaderMap) -> (String, String) {
    let full = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let base = full.split(';').next().unwrap_or_default().trim().to_string();
    (full, base)
}

/// Size and content-type checks over one request.
#[derive(Debug, Clone, Copy)]
pub struct PayloadGuard<'a> {
    config: &'a PayloadConfig,
}

impl<'a> PayloadGuard<'a> {
    #[must_use]
    pub const fn new(config: &'a PayloadConfig) -> Self {
        Self { config }
    }

    fn carries_body(&self, method: &Method) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH)
            || self.config.allowed_for(method.as_str()).is_some()
    }

    fn check_content_type(&self, request: &Request) -> Option<PayloadRejection> {
        if self
            .config
            .content_type_exempt_paths
            .contains(request.uri().path())
        {
            return None;
        }
        let allowed = self.config.allowed_for(request.method().as_str())?;
        let (full, base) = content_type_of(request.headers());
        if allowed.contains(&base) {
            return None;
        }
        Some(PayloadRejection::UnsupportedContentType {
            content_type: full,
            allowed: allowed.iter().cloned().collect(),
        })
    }

    pub async fn inspect(&self, request: Request) -> PayloadVerdict {
        let max_bytes = self.config.max_payload_bytes;

        if let Some(size_bytes) = declared_length(request.headers()) {
            if size_bytes > max_bytes {
                return PayloadVerdict::Rejected(PayloadRejection::TooLarge {
                    size_bytes,
                    max_bytes,
                });
            }
        }

        if !self.carries_body(request.method()) {
            return PayloadVerdict::Accepted(request);
        }

        let (parts, body) = request.into_parts();
        let bytes = match read_bounded(body, max_bytes).await {
            Ok(BoundedRead::Complete(bytes)) => bytes,
            Ok(BoundedRead::Exceeded) => {
                return PayloadVerdict::Rejected(PayloadRejection::TooLarge {
                    size_bytes: max_bytes.saturating_add(1),
                    max_bytes,
                });
            }
            Err(e) => {
                return PayloadVerdict::Rejected(PayloadRejection::UnreadableBody {
                    reason: e.to_string(),
                });
            }
        };

        let is_empty = bytes.is_empty();
        let mut request = Request::from_parts(parts, Body::from(bytes.clone()));
        request.extensions_mut().insert(BufferedBody(bytes));

        if !is_empty {
            if let Some(rejection) = self.check_content_type(&request) {
                return PayloadVerdict::Rejected(rejection);
            }
        }
        PayloadVerdict::Accepted(request)
    }
}

pub async fn payload_middleware(
    State(gatekeeper): State<Gatekeeper>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key_of(&request);
    let method = request.method().clone();
    let endpoint = request.uri().path().to_string();

    let rejection = match PayloadGuard::new(&gatekeeper.config().payload)
        .inspect(request)
        .await
    {
        PayloadVerdict::Accepted(request) => {
            if let Some(BufferedBody(bytes)) = request.extensions().get::<BufferedBody>() {
                access_log::log_request_body(&method, &endpoint, bytes);
            }
            return Ok(next.run(request).await);
        }
        PayloadVerdict::Rejected(rejection) => rejection,
    };

    if let Some(kind) = rejection.event_kind() {
        let mut details = json!({
            "client_ip": client.as_str(),
            "endpoint": endpoint,
            "method": method.as_str(),
        });
        match &rejection {
            PayloadRejection::TooLarge {
                size_bytes,
                max_bytes,
            } => {
                details["size_bytes"] = json!(size_bytes);
                details["max_size_bytes"] = json!(max_bytes);
            }
            PayloadRejection::UnsupportedContentType {
                content_type,
                allowed,
            } => {
                details["content_type"] = json!(content_type);
                details["allowed_types"] = json!(allowed);
            }
            PayloadRejection::UnreadableBody { .. } => {}
        }
        gatekeeper.audit().emit(kind, details);
    } else {
        tracing::warn!(%method, endpoint = %endpoint, ?rejection, "request body rejected");
    }

    Err(rejection.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: u64) -> PayloadConfig {
        PayloadConfig {
            max_payload_bytes: max,
            ..PayloadConfig::default()
        }
    }

    fn post(path: &str, content_type: &str, body: impl Into<Body>) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    fn rejected(verdict: PayloadVerdict) -> PayloadRejection {
        match verdict {
            PayloadVerdict::Rejected(r) => r,
            PayloadVerdict::Accepted(_) => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn declared_length_over_limit_is_rejected_unread() {
        let config = config(10);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/v1/samples")
            .header(header::CONTENT_LENGTH, "11")
            .body(Body::empty())
            .unwrap();
        let rejection = rejected(PayloadGuard::new(&config).inspect(request).await);
        assert_eq!(
            rejection,
            PayloadRejection::TooLarge {
                size_bytes: 11,
                max_bytes: 10
            }
        );
    }

    #[tokio::test]
    async fn garbage_content_length_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, "lots".parse().unwrap());
        assert_eq!(declared_length(&headers), None);
    }

    #[tokio::test]
    async fn undeclared_oversized_body_is_measured() {
        let config = config(8);
        // no Content-Length: the builder does not set one
        let request = post("/api/v1/samples", "application/json", "123456789abcdef");
        assert!(request.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(
            rejected(PayloadGuard::new(&config).inspect(request).await),
            PayloadRejection::TooLarge {
                size_bytes: 9,
                max_bytes: 8
            }
        );
    }

    #[tokio::test]
    async fn bounded_read_accepts_exact_limit() {
        let read = read_bounded(Body::from("12345678"), 8).await.unwrap();
        assert!(matches!(read, BoundedRead::Complete(b) if b.len() == 8));

        let read = read_bounded(Body::from("123456789"), 8).await.unwrap();
        assert!(matches!(read, BoundedRead::Exceeded));
    }

    #[tokio::test]
    async fn body_is_reattached_for_the_handler() {
        let config = config(1024);
        let request = post("/api/v1/samples", "application/json", r#"{"id":1}"#);
        let PayloadVerdict::Accepted(request) = PayloadGuard::new(&config).inspect(request).await
        else {
            panic!("expected acceptance");
        };
        let BufferedBody(buffered) = request.extensions().get::<BufferedBody>().cloned().unwrap();
        assert_eq!(&buffered[..], br#"{"id":1}"#);
        let bytes = request.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"id":1}"#);
    }

    #[tokio::test]
    async fn disallowed_type_with_body_is_rejected() {
        let config = config(1024);
        let request = post("/api/v1/samples", "Text/Plain; charset=utf-8", "hello");
        let rejection = rejected(PayloadGuard::new(&config).inspect(request).await);
        let PayloadRejection::UnsupportedContentType {
            content_type,
            allowed,
        } = rejection
        else {
            panic!("unexpected {rejection:?}");
        };
        assert_eq!(content_type, "text/plain; charset=utf-8");
        assert!(allowed.windows(2).all(|w| w[0] <= w[1]));
        assert!(allowed.contains(&"application/json".to_string()));
    }

    #[tokio::test]
    async fn disallowed_type_without_body_is_accepted() {
        let config = config(1024);
        let request = post("/api/v1/samples", "text/plain", Body::empty());
        assert!(matches!(
            PayloadGuard::new(&config).inspect(request).await,
            PayloadVerdict::Accepted(_)
        ));
    }

    #[tokio::test]
    async fn parameters_are_ignored_when_matching() {
        let config = config(1024);
        let request = post("/api/v1/samples", "application/json; charset=UTF-8", "{}");
        assert!(matches!(
            PayloadGuard::new(&config).inspect(request).await,
            PayloadVerdict::Accepted(_)
        ));
    }

    #[tokio::test]
    async fn exempt_paths_skip_content_type_but_not_size() {
        let config = config(4);
        let ok = post("/health", "text/plain", "ping");
        assert!(matches!(
            PayloadGuard::new(&config).inspect(ok).await,
            PayloadVerdict::Accepted(_)
        ));

        let big = post("/health", "text/plain", "pingpong");
        assert!(matches!(
            rejected(PayloadGuard::new(&config).inspect(big).await),
            PayloadRejection::TooLarge { .. }
        ));
    }

    #[test]
    fn too_large_translates_to_validation_details() {
        let err: ApiError = PayloadRejection::TooLarge {
            size_bytes: 20 * MIB,
            max_bytes: 10 * MIB,
        }
        .into();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        let ApiError::Validation { message, details } = err else {
            panic!("expected validation error");
        };
        assert_eq!(message, format!("Request payload too large: {} bytes", 20 * MIB));
        assert_eq!(details["max_size_mb"], 10);
    }
}
