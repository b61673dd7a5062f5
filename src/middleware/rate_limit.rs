//! Sliding-window rate limiting per client key.
//!
//! Each client owns a queue of admission timestamps no older than the
//! sustained window. A request is checked in order against:
//!
//! 1. the whitelist (admitted, not recorded),
//! 2. the sustained limit over `window_size_seconds`,
//! 3. the burst limit over the trailing `burst_window_seconds`,
//!
//! and is recorded only when admitted. Rejections carry a `retry_after`
//! hint: the time until the oldest entry leaves the window for the
//! sustained limit, the whole burst window for the burst limit.
//!
//! Each queue is kept in time order, so stale timestamps are pruned from
//! its front on every access. Clients that go quiet are dropped by a sweep that runs at most
//! once per `cleanup_interval_seconds`, piggybacked on request arrival.
//!
//! The map sits behind a `std::sync::Mutex`; the critical section holds no
//! `.await`. State is process-local: several replicas each enforce their
//! own limits.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;
use tokio::time::Instant;

use super::audit::SecurityEventKind;
use super::client_identity::{client_key_of, ClientKey};
use super::Gatekeeper;
use crate::api_error::{ApiError, Details};
use crate::config::model::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Sustained,
    Burst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub kind: LimitKind,
    pub limit: usize,
    /// Requests already recorded in the window that was exceeded.
    pub current: usize,
    pub window: Duration,
    pub retry_after: Duration,
}

impl RateLimitRejection {
    /// `retry_after` in whole seconds, rounded up and never below one.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(RateLimitRejection),
}

impl Admission {
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug)]
struct LimiterState {
    clients: HashMap<ClientKey, VecDeque<Instant>>,
    last_sweep: Instant,
}

#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    sustained_limit: usize,
    burst_limit: usize,
    window: Duration,
    burst_window: Duration,
    cleanup_interval: Duration,
    whitelist: BTreeSet<String>,
    state: Mutex<LimiterState>,
}

/// Drop timestamps that have aged out of `window`.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = timestamps.front() {
        if now.duration_since(oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

impl SlidingWindowRateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            sustained_limit: config.sustained_limit as usize,
            burst_limit: config.burst_limit as usize,
            window: config.window(),
            burst_window: config.burst_window(),
            cleanup_interval: config.cleanup_interval(),
            whitelist: config.whitelist.clone(),
            state: Mutex::new(LimiterState {
                clients: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Check `key` against the limits at the current time. The clock is read
    /// under the lock so concurrent admissions are recorded in order.
    pub fn check(&self, key: &ClientKey) -> Admission {
        if self.whitelist.contains(key.as_str()) {
            return Admission::Admitted;
        }
        let mut state = self.lock();
        let now = Instant::now();
        self.admit_locked(&mut state, key, now)
    }

    pub fn check_at(&self, key: &ClientKey, now: Instant) -> Admission {
        if self.whitelist.contains(key.as_str()) {
            return Admission::Admitted;
        }
        let mut state = self.lock();
        self.admit_locked(&mut state, key, now)
    }

    // A panic while holding the lock cannot leave the map in a state worse
    // than slightly stale timestamps, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit_locked(&self, state: &mut LimiterState, key: &ClientKey, now: Instant) -> Admission {
        self.sweep_locked(state, now);

        let timestamps = state.clients.entry(key.clone()).or_default();
        prune(timestamps, now, self.window);

        if timestamps.len() >= self.sustained_limit {
            let elapsed = timestamps
                .front()
                .map_or(Duration::ZERO, |&oldest| now.duration_since(oldest));
            return Admission::Rejected(RateLimitRejection {
                kind: LimitKind::Sustained,
                limit: self.sustained_limit,
                current: timestamps.len(),
                window: self.window,
                retry_after: self.window.saturating_sub(elapsed),
            });
        }

        let recent = timestamps
            .iter()
            .rev()
            .take_while(|&&t| now.duration_since(t) < self.burst_window)
            .count();
        if recent >= self.burst_limit {
            return Admission::Rejected(RateLimitRejection {
                kind: LimitKind::Burst,
                limit: self.burst_limit,
                current: recent,
                window: self.burst_window,
                retry_after: self.burst_window,
            });
        }

        // Usually the back; a caller-supplied earlier instant goes in order.
        let at = timestamps.partition_point(|&t| t <= now);
        timestamps.insert(at, now);
        Admission::Admitted
    }

    fn sweep_locked(&self, state: &mut LimiterState, now: Instant) {
        if now.duration_since(state.last_sweep) > self.cleanup_interval {
            self.sweep_now(state, now);
        }
    }

    fn sweep_now(&self, state: &mut LimiterState, now: Instant) {
        let before = state.clients.len();
        state.clients.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        state.last_sweep = now;
        tracing::debug!(
            removed = before - state.clients.len(),
            active_clients = state.clients.len(),
            "swept rate limit records"
        );
    }

    /// Force a sweep regardless of when the last one ran.
    pub fn sweep_at(&self, now: Instant) {
        let mut state = self.lock();
        self.sweep_now(&mut state, now);
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.lock().clients.len()
    }
}

pub async fn rate_limit_middleware(
    State(gatekeeper): State<Gatekeeper>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key_of(&request);

    let rejection = match gatekeeper.limiter().check(&key) {
        Admission::Admitted => return Ok(next.run(request).await),
        Admission::Rejected(rejection) => rejection,
    };

    let retry_after = rejection.retry_after_secs();
    let (event, message, mut details) = match rejection.kind {
        LimitKind::Sustained => {
            let mut details = Details::new();
            details.insert("limit".into(), json!(rejection.limit));
            details.insert("requests_count".into(), json!(rejection.current));
            (
                SecurityEventKind::RateLimitExceeded,
                format!("Rate limit exceeded. Too many requests from {key}"),
                details,
            )
        }
        LimitKind::Burst => {
            let mut details = Details::new();
            details.insert("burst_limit".into(), json!(rejection.limit));
            details.insert("recent_requests".into(), json!(rejection.current));
            (
                SecurityEventKind::BurstLimitExceeded,
                format!("Burst limit exceeded. Too many requests in short period from {key}"),
                details,
            )
        }
    };
    details.insert("window_seconds".into(), json!(rejection.window.as_secs()));

    gatekeeper.audit().emit(
        event,
        json!({
            "client_ip": key.as_str(),
            "endpoint": request.uri().path(),
            "method": request.method().as_str(),
            "limit": rejection.limit,
            "requests_count": rejection.current,
            "retry_after": retry_after,
        }),
    );

    Err(ApiError::RateLimit {
        message,
        retry_after,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(sustained: u32, burst: u32) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(&RateLimitConfig {
            sustained_limit: sustained,
            burst_limit: burst,
            ..RateLimitConfig::default()
        })
    }

    fn rejection(admission: Admission) -> RateLimitRejection {
        match admission {
            Admission::Rejected(r) => r,
            Admission::Admitted => panic!("expected rejection"),
        }
    }

    #[test]
    fn admits_up_to_sustained_limit_then_rejects() {
        let limiter = limiter(5, 100);
        let key = ClientKey::from("9.9.9.9");
        let start = Instant::now();

        for i in 0..5 {
            let at = start + Duration::from_millis(i * 100);
            assert!(limiter.check_at(&key, at).is_admitted(), "request {i}");
        }

        let r = rejection(limiter.check_at(&key, start + Duration::from_secs(1)));
        assert_eq!(r.kind, LimitKind::Sustained);
        assert_eq!(r.current, 5);
        // oldest entry is 1s old, so 59s remain in the window
        assert_eq!(r.retry_after, Duration::from_secs(59));
        assert!((1..=60).contains(&r.retry_after_secs()));
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let limiter = limiter(2, 100);
        let key = ClientKey::from("a");
        let start = Instant::now();

        assert!(limiter.check_at(&key, start).is_admitted());
        assert!(limiter.check_at(&key, start).is_admitted());
        for _ in 0..10 {
            assert!(!limiter.check_at(&key, start).is_admitted());
        }
        // the window frees up as soon as the two admitted entries age out
        assert!(limiter
            .check_at(&key, start + Duration::from_secs(60))
            .is_admitted());
    }

    #[test]
    fn window_expiry_readmits_client() {
        let limiter = limiter(3, 100);
        let key = ClientKey::from("b");
        let start = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at(&key, start).is_admitted());
        }
        assert!(!limiter
            .check_at(&key, start + Duration::from_secs(59))
            .is_admitted());
        assert!(limiter
            .check_at(&key, start + Duration::from_secs(60))
            .is_admitted());
    }

    #[test]
    fn burst_limit_applies_below_sustained_limit() {
        let limiter = limiter(60, 3);
        let key = ClientKey::from("c");
        let start = Instant::now();
        for i in 0..3 {
            assert!(limiter
                .check_at(&key, start + Duration::from_secs(i))
                .is_admitted());
        }

        let r = rejection(limiter.check_at(&key, start + Duration::from_secs(3)));
        assert_eq!(r.kind, LimitKind::Burst);
        assert_eq!(r.current, 3);
        assert_eq!(r.retry_after_secs(), 10);

        // the first entry leaves the burst window at +10s
        assert!(limiter
            .check_at(&key, start + Duration::from_secs(10))
            .is_admitted());
    }

    #[test]
    fn sustained_check_runs_before_burst_check() {
        let limiter = limiter(2, 2);
        let key = ClientKey::from("d");
        let start = Instant::now();
        limiter.check_at(&key, start);
        limiter.check_at(&key, start);
        let r = rejection(limiter.check_at(&key, start));
        assert_eq!(r.kind, LimitKind::Sustained);
    }

    #[test]
    fn whitelisted_clients_are_never_limited_or_tracked() {
        let limiter = SlidingWindowRateLimiter::new(&RateLimitConfig {
            sustained_limit: 1,
            burst_limit: 1,
            whitelist: ["10.0.0.1".to_string()].into_iter().collect(),
            ..RateLimitConfig::default()
        });
        let key = ClientKey::from("10.0.0.1");
        let now = Instant::now();
        for _ in 0..1000 {
            assert!(limiter.check_at(&key, now).is_admitted());
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = limiter(1, 1);
        let now = Instant::now();
        assert!(limiter.check_at(&ClientKey::from("x"), now).is_admitted());
        assert!(limiter.check_at(&ClientKey::from("y"), now).is_admitted());
        assert!(!limiter.check_at(&ClientKey::from("x"), now).is_admitted());
    }

    #[test]
    fn sweep_drops_idle_clients() {
        let limiter = limiter(10, 10);
        let start = Instant::now();
        limiter.check_at(&ClientKey::from("idle"), start);
        limiter.check_at(&ClientKey::from("busy"), start + Duration::from_secs(100));
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.sweep_at(start + Duration::from_secs(120));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn sweep_runs_opportunistically_after_interval() {
        let limiter = limiter(10, 10);
        let start = Instant::now();
        limiter.check_at(&ClientKey::from("idle"), start);

        // before the interval elapses, idle entries survive
        limiter.check_at(&ClientKey::from("other"), start + Duration::from_secs(200));
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.check_at(&ClientKey::from("other"), start + Duration::from_secs(301));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn late_arriving_earlier_admission_still_expires() {
        let limiter = limiter(2, 100);
        let key = ClientKey::from("e");
        let t1 = Instant::now();

        assert!(limiter
            .check_at(&key, t1 + Duration::from_millis(5))
            .is_admitted());
        assert!(limiter.check_at(&key, t1).is_admitted());

        // t1 has aged out, t1+5ms has not: one slot is free again
        assert!(limiter
            .check_at(&key, t1 + Duration::from_secs(60))
            .is_admitted());
        let r = rejection(limiter.check_at(&key, t1 + Duration::from_secs(60)));
        assert_eq!(r.current, 2);
        assert_eq!(r.retry_after, Duration::from_millis(5));
    }

    #[test]
    fn retry_after_rounds_up() {
        let r = RateLimitRejection {
            kind: LimitKind::Sustained,
            limit: 1,
            current: 1,
            window: Duration::from_secs(60),
            retry_after: Duration::from_millis(100),
        };
        assert_eq!(r.retry_after_secs(), 1);
    }
}
