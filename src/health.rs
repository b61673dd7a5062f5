//! `GET /health` and `GET /` handlers.
//!
//! The health payload reports build metadata, uptime, the fingerprint of
//! the effective gatekeeper config and live rate-limiter occupancy.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

pub const SERVICE_NAME: &str = "specimen-gate";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub commit: String,
    pub build_profile: String,
    pub uptime_seconds: u64,
    pub config_fingerprint: String,
    pub rate_limit: RateLimitHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitHealth {
    pub tracked_clients: usize,
    pub sustained_limit: u32,
    pub burst_limit: u32,
    pub window_size_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub health: String,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let gatekeeper = &state.gatekeeper;
    let rate = &gatekeeper.config().rate_limit;

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("SPECIMEN_GATE_GIT_SHORT").to_string(),
        build_profile: env!("SPECIMEN_GATE_BUILD_PROFILE").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config_fingerprint: state.fingerprint.get(..12).unwrap_or(&state.fingerprint).to_string(),
        rate_limit: RateLimitHealth {
            tracked_clients: gatekeeper.limiter().tracked_clients(),
            sustained_limit: rate.sustained_limit,
            burst_limit: rate.burst_limit,
            window_size_seconds: rate.window_size_seconds,
        },
    })
}

pub async fn root_handler() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        health: "/health".to_string(),
    })
}
