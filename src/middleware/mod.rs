//! The request-gatekeeping pipeline.
//!
//! [`Gatekeeper`] bundles the shared config, the rate limiter and the audit
//! handle, and [`Gatekeeper::wrap`] installs every guard around a router.
//! Requests pass through the stages outermost first:
//!
//! | Stage | Module | Outcome |
//! |-------|--------|---------|
//! | CORS | [`cors`] | answers preflights, decorates responses |
//! | Security headers | [`security_headers`] | decorates every response |
//! | Correlation id + access log | [`correlation`], [`access_log`] | never rejects |
//! | Threat signals | [`threat`] | advisory events only |
//! | Rate limit | [`rate_limit`] | 429 `RATE_LIMIT_ERROR` |
//! | Payload | [`payload`] | 400 `VALIDATION_ERROR` |
//! | Timeout | [`timeout`] | 408 `REQUEST_TIMEOUT` |
//!
//! A rejecting stage short-circuits: nothing inside it runs, including the
//! handler. Rejections are rendered by [`ApiError`](crate::api_error::ApiError)
//! and still pass back out through the outer stages, so they carry the
//! security headers and correlation id like any other response.

pub mod access_log;
pub mod audit;
pub mod client_identity;
pub mod correlation;
pub mod cors;
pub mod payload;
pub mod rate_limit;
pub mod security_headers;
pub mod threat;
pub mod timeout;

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;

use crate::config::GatekeeperConfig;
use audit::SecurityAudit;
use rate_limit::SlidingWindowRateLimiter;

#[derive(Debug)]
struct Inner {
    config: Arc<GatekeeperConfig>,
    limiter: SlidingWindowRateLimiter,
    audit: SecurityAudit,
}

/// Shared state of the guard chain. Cloning is a refcount bump.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    inner: Arc<Inner>,
}

impl Gatekeeper {
    #[must_use]
    pub fn new(config: Arc<GatekeeperConfig>) -> Self {
        Self::with_audit(config, SecurityAudit::tracing())
    }

    #[must_use]
    pub fn with_audit(config: Arc<GatekeeperConfig>, audit: SecurityAudit) -> Self {
        let limiter = SlidingWindowRateLimiter::new(&config.rate_limit);
        Self {
            inner: Arc::new(Inner {
                config,
                limiter,
                audit,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GatekeeperConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn limiter(&self) -> &SlidingWindowRateLimiter {
        &self.inner.limiter
    }

    #[must_use]
    pub fn audit(&self) -> &SecurityAudit {
        &self.inner.audit
    }

    /// Wrap `router` (routes and fallback) in the full guard chain.
    pub fn wrap<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Each layer wraps the ones added before it: innermost first.
        router
            .layer(from_fn_with_state(self.clone(), timeout::timeout_middleware))
            .layer(from_fn_with_state(self.clone(), payload::payload_middleware))
            .layer(from_fn_with_state(
                self.clone(),
                rate_limit::rate_limit_middleware,
            ))
            .layer(from_fn_with_state(self.clone(), threat::threat_middleware))
            .layer(from_fn_with_state(
                self.clone(),
                access_log::access_log_middleware,
            ))
            .layer(from_fn(correlation::correlation_middleware))
            .layer(from_fn_with_state(
                self.clone(),
                security_headers::security_headers_middleware,
            ))
            .layer(cors::cors_layer(&self.config().security))
    }
}
