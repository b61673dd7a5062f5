//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (uptime, config fingerprint and the
//! [`Gatekeeper`]), [`build_router`] which wraps the service routes in the
//! guard chain, and [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::Arc;
use std::time::Instant;

use axum::http::Uri;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::api_error::ApiError;
use crate::config::loader;
use crate::config::GatekeeperConfig;
use crate::health::{health_handler, root_handler};
use crate::middleware::Gatekeeper;

#[derive(Debug)]
pub struct AppState {
    pub gatekeeper: Gatekeeper,
    pub start_time: Instant,
    pub fingerprint: String,
}

impl AppState {
    #[must_use]
    pub fn new(gatekeeper: Gatekeeper) -> Self {
        let fingerprint = loader::fingerprint(gatekeeper.config());
        Self {
            gatekeeper,
            start_time: Instant::now(),
            fingerprint,
        }
    }

    #[must_use]
    pub fn from_config(config: GatekeeperConfig) -> Self {
        Self::new(Gatekeeper::new(Arc::new(config)))
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound {
        resource: format!("Endpoint {}", uri.path()),
    }
}

/// Service routes with the guard chain, `TraceLayer` outermost.
pub fn build_router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .fallback(not_found);

    state
        .gatekeeper
        .wrap(routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
