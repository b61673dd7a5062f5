//! Per-request correlation ids.
//!
//! [`correlation_middleware`] reuses an inbound `X-Correlation-ID` or
//! generates a UUID v4, binds it to a task-local for the rest of the
//! request, records it on the request's tracing span, and echoes it on the
//! response. Code running anywhere inside the request's future can read it
//! with [`current`] without threading it through arguments.
//!
//! The binding follows the request future, not the OS thread, so
//! concurrently handled requests never observe each other's id. Tasks
//! spawned with `tokio::spawn` do not inherit it; wrap them in [`scope`].

use std::future::Future;

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

tokio::task_local! {
    static CORRELATION_ID: CorrelationId;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Reuse a non-empty inbound header, otherwise generate a fresh id.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(&CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(Self::generate, Self::from)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The id bound to the request currently executing, if any.
#[must_use]
pub fn current() -> Option<CorrelationId> {
    CORRELATION_ID.try_with(Clone::clone).ok()
}

/// Run `future` with `id` as its ambient correlation id.
pub async fn scope<F: Future>(id: CorrelationId, future: F) -> F::Output {
    CORRELATION_ID.scope(id, future).await
}

pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let id = CorrelationId::from_headers(request.headers());
    request.extensions_mut().insert(id.clone());

    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = scope(id.clone(), next.run(request)).instrument(span).await;

    match HeaderValue::from_str(id.as_str()) {
        Ok(value) => {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        Err(e) => {
            tracing::warn!(correlation_id = %id, error = %e, "correlation id not echoable");
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_id_is_reused() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, "abc-123".parse().unwrap());
        assert_eq!(CorrelationId::from_headers(&headers).as_str(), "abc-123");
    }

    #[test]
    fn blank_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, "   ".parse().unwrap());
        let id = CorrelationId::from_headers(&headers);
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn nothing_bound_outside_a_request() {
        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn interleaved_scopes_stay_isolated() {
        let run = |name: &'static str| {
            scope(CorrelationId::from(name), async move {
                for _ in 0..5 {
                    assert_eq!(current().unwrap().as_str(), name);
                    tokio::task::yield_now().await;
                }
                current().unwrap()
            })
        };

        let (a, b) = tokio::join!(run("first"), run("second"));
        assert_eq!(a.as_str(), "first");
        assert_eq!(b.as_str(), "second");
        assert_eq!(current(), None);
    }
}
