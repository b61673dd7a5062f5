//! `specimen-gate run`: start the gated service.
//!
//! Resolves the gatekeeper config (file, then flag/env overrides),
//! validates it once, and serves the routes behind the guard chain until
//! SIGTERM or Ctrl+C.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::model::MIB;
use crate::config::{loader, validation, GatekeeperConfig};
use crate::error::GatekeeperError;
use crate::logging;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), GatekeeperError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = resolve_config(&args).await?;
    let state = Arc::new(AppState::from_config(config));
    let config = state.gatekeeper.config();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        sustained_limit = config.rate_limit.sustained_limit,
        burst_limit = config.rate_limit.burst_limit,
        max_payload_bytes = config.payload.max_payload_bytes,
        request_timeout_seconds = config.timeout.request_timeout_seconds,
        hsts = config.security.hsts_enabled,
        cors_origins = config.security.cors_origins.len(),
        whitelisted = config.rate_limit.whitelist.len(),
        fingerprint = %state.fingerprint,
        "specimen-gate started"
    );

    let router = server::build_router(Arc::clone(&state));
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await?;

    tracing::info!("specimen-gate stopped");
    Ok(())
}

async fn resolve_config(args: &RunArgs) -> Result<GatekeeperConfig, GatekeeperError> {
    let mut config = match config_path(args.config.as_deref()).await {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config file");
            loader::load_file(&path).await?
        }
        None => GatekeeperConfig::default(),
    };

    apply_overrides(&mut config, args);

    validation::validate(&config).map_err(|errors| GatekeeperError::ConfigValidation { errors })?;
    Ok(config)
}

async fn config_path(explicit: Option<&Path>) -> Option<std::path::PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let detected = loader::detect_config_file().await;
    if let Some(path) = &detected {
        tracing::info!(path = %path.display(), "auto-detected config file");
    }
    detected
}

/// Flags and env vars win over the file for every field they set.
pub fn apply_overrides(config: &mut GatekeeperConfig, args: &RunArgs) {
    let rate = &mut config.rate_limit;
    if let Some(limit) = args.rate_limit_per_minute {
        rate.sustained_limit = limit;
    }
    if let Some(burst) = args.rate_limit_burst {
        rate.burst_limit = burst;
    }
    if let Some(window) = args.rate_limit_window_seconds {
        rate.window_size_seconds = window;
    }
    if let Some(window) = args.rate_limit_burst_window_seconds {
        rate.burst_window_seconds = window;
    }
    rate.whitelist.extend(
        args.whitelist
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .map(str::to_string),
    );

    if let Some(secs) = args.request_timeout_seconds {
        config.timeout.request_timeout_seconds = secs;
    }
    if let Some(mb) = args.max_payload_size_mb {
        config.payload.max_payload_bytes = mb.saturating_mul(MIB);
    }
    if let Some(hsts) = args.enable_hsts {
        config.security.hsts_enabled = hsts;
    }

    let origins: Vec<String> = args
        .cors_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();
    if !origins.is_empty() {
        config.security.cors_origins = origins;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn run_args(flags: &[&str]) -> RunArgs {
        let argv = ["specimen-gate", "run"].iter().chain(flags);
        match Cli::parse_from(argv).command {
            Some(Commands::Run(args)) => *args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let mut config = GatekeeperConfig::default();
        config.rate_limit.sustained_limit = 7;
        config.security.hsts_enabled = true;

        apply_overrides(&mut config, &run_args(&[]));
        assert_eq!(config.rate_limit.sustained_limit, 7);
        assert_eq!(config.security.cors_origins.len(), 2);
        assert!(config.security.hsts_enabled);
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = GatekeeperConfig::default();
        config.rate_limit.whitelist.insert("10.0.0.9".into());

        let args = run_args(&[
            "--rate-limit-per-minute",
            "120",
            "--rate-limit-burst",
            "20",
            "--max-payload-size-mb",
            "2",
            "--request-timeout-seconds",
            "5",
            "--enable-hsts",
            "true",
            "--whitelist",
            "10.0.0.1, ,10.0.0.2",
            "--cors-origins",
            "https://lab.example.org, https://qa.example.org",
        ]);
        apply_overrides(&mut config, &args);

        assert_eq!(config.rate_limit.sustained_limit, 120);
        assert_eq!(config.rate_limit.burst_limit, 20);
        assert_eq!(config.payload.max_payload_bytes, 2 * MIB);
        assert_eq!(config.timeout.request_timeout_seconds, 5);
        assert!(config.security.hsts_enabled);
        assert_eq!(
            config.security.cors_origins,
            vec!["https://lab.example.org", "https://qa.example.org"]
        );
        assert_eq!(
            config.rate_limit.whitelist.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.9"]
        );
    }
}
