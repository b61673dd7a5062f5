//! Security audit events.
//!
//! Guards report noteworthy traffic as a [`SecurityEvent`] through a
//! [`SecurityAudit`] handle. Events are write-only: the default
//! [`TracingAuditSink`] emits them as structured WARN records on the
//! `security` target, and [`MemoryAuditSink`] keeps them for inspection
//! in tests. Each event carries the correlation id of the request that
//! produced it, when one is bound.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use super::correlation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    RateLimitExceeded,
    BurstLimitExceeded,
    OversizedRequest,
    InvalidContentType,
    RequestTimeout,
    SuspiciousRequest,
    LargeHeaders,
    SuspiciousUserAgent,
    AuthAttempt,
    AuthResponse,
    AuthFailed,
    RequestFailed,
}

impl SecurityEventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::BurstLimitExceeded => "burst_limit_exceeded",
            Self::OversizedRequest => "oversized_request",
            Self::InvalidContentType => "invalid_content_type",
            Self::RequestTimeout => "request_timeout",
            Self::SuspiciousRequest => "suspicious_request",
            Self::LargeHeaders => "large_headers",
            Self::SuspiciousUserAgent => "suspicious_user_agent",
            Self::AuthAttempt => "auth_attempt",
            Self::AuthResponse => "auth_response",
            Self::AuthFailed => "auth_failed",
            Self::RequestFailed => "request_failed",
        }
    }
}

impl std::fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventKind,
    pub details: Value,
    pub correlation_id: Option<String>,
}

pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, event: SecurityEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: SecurityEvent) {
        tracing::warn!(
            target: "security",
            event_type = %event.event_type,
            correlation_id = event.correlation_id.as_deref().unwrap_or("none"),
            details = %event.details,
            "security event"
        );
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<SecurityEventKind> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: SecurityEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Cheaply cloneable handle guards use to emit events.
#[derive(Clone)]
pub struct SecurityAudit {
    sink: Arc<dyn AuditSink>,
}

impl SecurityAudit {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    #[must_use]
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }

    pub fn emit(&self, event_type: SecurityEventKind, details: Value) {
        self.sink.record(SecurityEvent {
            event_type,
            details,
            correlation_id: correlation::current().map(|id| id.as_str().to_string()),
        });
    }
}

impl Default for SecurityAudit {
    fn default() -> Self {
        Self::tracing()
    }
}

impl std::fmt::Debug for SecurityAudit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityAudit").finish_non_exhaustive()
    }
}
