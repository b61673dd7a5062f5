//! Advisory threat signals.
//!
//! Looks for injection-looking URLs, oversized header blocks and known
//! scanner user agents, and watches the authentication surface for
//! 401/403 responses. Every finding becomes a security event; the request
//! itself is never altered or rejected here.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::{header, HeaderMap, StatusCode, Uri};
use serde_json::json;

use super::audit::{SecurityAudit, SecurityEventKind};
use super::client_identity::client_key_of;
use super::Gatekeeper;

pub const URL_PATTERNS: &[&str] = &[
    "union",
    "select",
    "insert",
    "update",
    "delete",
    "drop",
    "exec",
    "execute",
    "script",
    "javascript",
    "onload",
    "onerror",
];

pub const SCANNER_AGENTS: &[&str] = &["sqlmap", "nmap", "nikto", "dirb", "gobuster", "wfuzz"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreatSignal {
    SuspiciousUrl { pattern: &'static str },
    LargeHeaders { size: usize },
    ScannerAgent { user_agent: String },
}

impl ThreatSignal {
    #[must_use]
    pub const fn kind(&self) -> SecurityEventKind {
        match self {
            Self::SuspiciousUrl { .. } => SecurityEventKind::SuspiciousRequest,
            Self::LargeHeaders { .. } => SecurityEventKind::LargeHeaders,
            Self::ScannerAgent { .. } => SecurityEventKind::SuspiciousUserAgent,
        }
    }
}

/// Sum of header name and value lengths.
#[must_use]
pub fn header_block_size(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum()
}

/// Run every request-side check. Each check reports at most one signal.
#[must_use]
pub fn scan(uri: &Uri, headers: &HeaderMap, header_limit: usize) -> Vec<ThreatSignal> {
    let mut signals = Vec::new();

    let url = uri.to_string().to_ascii_lowercase();
    if let Some(pattern) = URL_PATTERNS.iter().copied().find(|p| url.contains(p)) {
        signals.push(ThreatSignal::SuspiciousUrl { pattern });
    }

    let size = header_block_size(headers);
    if size > header_limit {
        signals.push(ThreatSignal::LargeHeaders { size });
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if SCANNER_AGENTS.iter().any(|agent| user_agent.contains(agent)) {
        signals.push(ThreatSignal::ScannerAgent { user_agent });
    }

    signals
}

#[must_use]
pub fn is_auth_failure(path: &str, auth_prefix: &str, status: StatusCode) -> bool {
    path.starts_with(auth_prefix)
        && matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

fn report(audit: &SecurityAudit, signal: ThreatSignal, url: &str, method: &str, client: &str) {
    let kind = signal.kind();
    let mut details = json!({
        "url": url,
        "method": method,
        "remote_addr": client,
    });
    match signal {
        ThreatSignal::SuspiciousUrl { pattern } => details["pattern"] = json!(pattern),
        ThreatSignal::LargeHeaders { size } => details["header_size"] = json!(size),
        ThreatSignal::ScannerAgent { user_agent } => details["user_agent"] = json!(user_agent),
    }
    audit.emit(kind, details);
}

pub async fn threat_middleware(
    State(gatekeeper): State<Gatekeeper>,
    request: Request,
    next: Next,
) -> Response {
    let security = &gatekeeper.config().security;
    let client = client_key_of(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let url = request.uri().to_string();

    for signal in scan(request.uri(), request.headers(), security.header_size_soft_limit) {
        report(gatekeeper.audit(), signal, &url, method.as_str(), client.as_str());
    }

    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(request).await;

    if is_auth_failure(&path, &security.auth_path_prefix, response.status()) {
        gatekeeper.audit().emit(
            SecurityEventKind::AuthFailed,
            json!({
                "endpoint": path,
                "method": method.as_str(),
                "status_code": response.status().as_u16(),
                "user_agent": user_agent,
                "remote_addr": client.as_str(),
            }),
        );
    }
    response
}
