//! Serde data structures for the gatekeeper configuration file.
//!
//! Contains [`GatekeeperConfig`] (the root) and its sections:
//! [`RateLimitConfig`], [`PayloadConfig`], [`TimeoutConfig`] and
//! [`SecurityConfig`] (which also carries the CORS origins). Every field has a default so an empty file is a
//! valid config; `deny_unknown_fields` keeps typos from being ignored.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;

const fn default_sustained_limit() -> u32 {
    60
}

const fn default_burst_limit() -> u32 {
    10
}

const fn default_window_size() -> u64 {
    60
}

const fn default_burst_window() -> u64 {
    10
}

const fn default_cleanup_interval() -> u64 {
    300
}

const fn default_max_payload_bytes() -> u64 {
    10 * MIB
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_slow_request_ms() -> u64 {
    1000
}

const fn default_header_size_soft_limit() -> usize {
    8192
}

fn default_auth_path_prefix() -> String {
    "/api/v1/auth/".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8080".to_string(),
    ]
}

fn default_allowed_content_types() -> BTreeMap<String, BTreeSet<String>> {
    let body_types: BTreeSet<String> = [
        "application/json",
        "application/x-www-form-urlencoded",
        "multipart/form-data",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    ["POST", "PUT", "PATCH"]
        .iter()
        .map(|method| ((*method).to_string(), body_types.clone()))
        .collect()
}

fn default_exempt_paths() -> BTreeSet<String> {
    ["/health", "/", "/docs", "/redoc", "/openapi.json"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatekeeperConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub payload: PayloadConfig,

    #[serde(default)]
    pub timeout: TimeoutConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests admitted per client within `window_size_seconds`.
    #[serde(default = "default_sustained_limit")]
    pub sustained_limit: u32,

    /// Requests admitted per client within `burst_window_seconds`.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,

    #[serde(default = "default_window_size")]
    pub window_size_seconds: u64,

    #[serde(default = "default_burst_window")]
    pub burst_window_seconds: u64,

    /// Minimum time between sweeps that drop idle clients.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,

    /// Client keys that bypass rate limiting entirely.
    #[serde(default)]
    pub whitelist: BTreeSet<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sustained_limit: default_sustained_limit(),
            burst_limit: default_burst_limit(),
            window_size_seconds: default_window_size(),
            burst_window_seconds: default_burst_window(),
            cleanup_interval_seconds: default_cleanup_interval(),
            whitelist: BTreeSet::new(),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_size_seconds)
    }

    #[must_use]
    pub const fn burst_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_seconds)
    }

    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PayloadConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    /// Accepted MIME types keyed by upper-case HTTP method. Methods absent
    /// from the map are not content-type checked.
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: BTreeMap<String, BTreeSet<String>>,

    /// Paths that skip the content-type check (size is still enforced).
    #[serde(default = "default_exempt_paths")]
    pub content_type_exempt_paths: BTreeSet<String>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            allowed_content_types: default_allowed_content_types(),
            content_type_exempt_paths: default_exempt_paths(),
        }
    }
}

impl PayloadConfig {
    #[must_use]
    pub fn allowed_for(&self, method: &str) -> Option<&BTreeSet<String>> {
        self.allowed_content_types.get(method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Responses slower than this are logged as slow requests.
    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            slow_request_ms: default_slow_request_ms(),
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    #[must_use]
    pub const fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    #[serde(default)]
    pub hsts_enabled: bool,

    /// Path prefix of the authentication surface watched for 401/403.
    #[serde(default = "default_auth_path_prefix")]
    pub auth_path_prefix: String,

    /// Total header bytes above which a `large_headers` event is logged.
    #[serde(default = "default_header_size_soft_limit")]
    pub header_size_soft_limit: usize,

    /// Browser origins allowed to call the service with credentials.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hsts_enabled: false,
            auth_path_prefix: default_auth_path_prefix(),
            header_size_soft_limit: default_header_size_soft_limit(),
            cors_origins: default_cors_origins(),
        }
    }
}
