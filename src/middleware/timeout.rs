//! Request deadline.
//!
//! The rest of the chain runs under `tokio::time::timeout`. When the
//! deadline passes first, the inner future is dropped, which cancels the
//! handler and everything it was awaiting. Work the handler moved onto a
//! `tokio::spawn`ed task keeps running.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;

use super::audit::SecurityEventKind;
use super::client_identity::client_key_of;
use super::Gatekeeper;
use crate::api_error::ApiError;

pub async fn timeout_middleware(
    State(gatekeeper): State<Gatekeeper>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let timeout = &gatekeeper.config().timeout;
    let client = client_key_of(&request);
    let method = request.method().clone();
    let endpoint = request.uri().path().to_string();

    match tokio::time::timeout(timeout.request_timeout(), next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_elapsed) => {
            tracing::warn!(
                %method,
                endpoint = %endpoint,
                timeout_seconds = timeout.request_timeout_seconds,
                "request timed out"
            );
            gatekeeper.audit().emit(
                SecurityEventKind::RequestTimeout,
                json!({
                    "client_ip": client.as_str(),
                    "endpoint": endpoint,
                    "method": method.as_str(),
                    "timeout_seconds": timeout.request_timeout_seconds,
                }),
            );
            Err(ApiError::RequestTimeout {
                timeout_seconds: timeout.request_timeout_seconds,
            })
        }
    }
}
