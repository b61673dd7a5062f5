//! Request/response access logging.
//!
//! Runs inside the correlation span, so every record carries the request's
//! correlation id. Credentials in request headers are redacted before they
//! reach the log, and so are credential fields of logged JSON bodies.
//!
//! Besides the log lines, this stage reports traffic on the authentication
//! surface (`auth_attempt` before the handler, `auth_response` after it) and
//! every 5xx response as `request_failed`.

use std::collections::BTreeMap;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{json, Value};
use tokio::time::Instant;

use super::audit::SecurityEventKind;
use super::client_identity::client_key_of;
use super::Gatekeeper;

const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "x-api-key"];
const SENSITIVE_BODY_KEYS: &[&str] = &["password", "token", "secret"];
const REDACTED: &str = "[REDACTED]";

#[must_use]
pub const fn status_category(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "success",
        300..=399 => "redirect",
        400..=499 => "client_error",
        500..=599 => "server_error",
        _ => "informational",
    }
}

/// Header map flattened for logging, with credentials masked. Repeated
/// headers are joined with `", "`.
#[must_use]
pub fn redacted_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let sensitive = SENSITIVE_HEADERS.contains(&name.as_str());
        let shown = if sensitive {
            REDACTED.into()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        flat.entry(name.as_str().to_string())
            .and_modify(|joined| {
                if !sensitive {
                    joined.push_str(", ");
                    joined.push_str(&shown);
                }
            })
            .or_insert(shown);
    }
    flat
}

/// Loggable view of a request body. JSON objects lose their credential
/// fields, other JSON values are wrapped, and anything else is reduced to
/// its size. Empty bodies are not logged.
#[must_use]
pub fn body_summary(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    let summary = match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(mut fields)) => {
            fields.retain(|key, _| {
                !SENSITIVE_BODY_KEYS.contains(&key.to_lowercase().as_str())
            });
            Value::Object(fields)
        }
        Ok(other) => json!({ "parsed_body": other }),
        Err(_) => json!({ "raw_body_size": bytes.len() }),
    };
    Some(summary)
}

/// Log the buffered body of a non-GET request.
pub fn log_request_body(method: &Method, endpoint: &str, bytes: &[u8]) {
    if *method == Method::GET {
        return;
    }
    if let Some(body) = body_summary(bytes) {
        tracing::info!(%method, endpoint = %endpoint, body = %body, "request body");
    }
}

fn millis(elapsed: std::time::Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

pub async fn access_log_middleware(
    State(gatekeeper): State<Gatekeeper>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.uri().to_string();
    let endpoint = request.uri().path().to_string();
    let client = client_key_of(&request);
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let auth_path = endpoint.starts_with(&gatekeeper.config().security.auth_path_prefix);

    tracing::info!(
        %method,
        url = %url,
        client = %client,
        user_agent = %user_agent,
        headers = ?redacted_headers(request.headers()),
        "request received"
    );

    if auth_path {
        gatekeeper.audit().emit(
            SecurityEventKind::AuthAttempt,
            json!({
                "endpoint": endpoint,
                "method": method.as_str(),
                "user_agent": user_agent,
                "remote_addr": client.as_str(),
            }),
        );
    }

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status();
    let response_time_ms = millis(elapsed);
    let category = status_category(status);

    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), category, response_time_ms, "response sent");
        gatekeeper.audit().emit(
            SecurityEventKind::RequestFailed,
            json!({
                "endpoint": endpoint,
                "method": method.as_str(),
                "status_code": status.as_u16(),
                "error": status.canonical_reason().unwrap_or("server error"),
                "response_time_ms": response_time_ms,
            }),
        );
    } else if status.is_client_error() {
        tracing::warn!(status = status.as_u16(), category, response_time_ms, "response sent");
    } else {
        tracing::info!(status = status.as_u16(), category, response_time_ms, "response sent");
    }

    if auth_path {
        gatekeeper.audit().emit(
            SecurityEventKind::AuthResponse,
            json!({
                "endpoint": endpoint,
                "status_code": status.as_u16(),
                "response_time_ms": response_time_ms,
                "success": status.is_success(),
            }),
        );
    }

    if elapsed > gatekeeper.config().timeout.slow_request_threshold() {
        tracing::warn!(
            %method,
            url = %url,
            status = status.as_u16(),
            response_time_ms,
            "slow request detected"
        );
    }

    response
}
