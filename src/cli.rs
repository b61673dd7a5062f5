//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every flag has an environment variable equivalent for
//! container deployments. Guard flags are optional: when absent, the
//! config file (or the built-in default) decides.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "specimen-gate",
    version,
    about = "Request-gatekeeping pipeline for the clinical sample service",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        specimen-gate run                         Start with defaults or ./specimen-gate.yaml\n  \
        specimen-gate run -c gate.yaml            Start with a specific config\n  \
        specimen-gate validate gate.yaml          Check a config file"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gated service
    Run(Box<RunArgs>),

    /// Validate a config file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        specimen-gate run -p 8080 --pretty                 Local dev mode\n  \
        specimen-gate run --rate-limit-per-minute 120      Raise the sustained limit\n  \
        specimen-gate run --whitelist 10.0.0.1,10.0.0.2    Exempt internal callers")]
pub struct RunArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Rate limiting --
    /// Requests admitted per client per window
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", help_heading = "Rate Limiting")]
    pub rate_limit_per_minute: Option<u32>,

    /// Requests admitted per client per burst window
    #[arg(long, env = "RATE_LIMIT_BURST", help_heading = "Rate Limiting")]
    pub rate_limit_burst: Option<u32>,

    /// Sustained window length in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECONDS", help_heading = "Rate Limiting")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Burst window length in seconds
    #[arg(
        long,
        env = "RATE_LIMIT_BURST_WINDOW_SECONDS",
        help_heading = "Rate Limiting"
    )]
    pub rate_limit_burst_window_seconds: Option<u64>,

    /// Client keys exempt from rate limiting (comma separated)
    #[arg(
        long,
        env = "RATE_LIMIT_WHITELIST",
        value_delimiter = ',',
        help_heading = "Rate Limiting"
    )]
    pub whitelist: Vec<String>,

    // -- Tuning --
    /// Handler deadline in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", help_heading = "Tuning")]
    pub request_timeout_seconds: Option<u64>,

    /// Max request payload in MiB
    #[arg(long, env = "MAX_PAYLOAD_SIZE_MB", help_heading = "Tuning")]
    pub max_payload_size_mb: Option<u64>,

    /// Send Strict-Transport-Security on every response
    #[arg(long, env = "ENABLE_HSTS", help_heading = "Tuning")]
    pub enable_hsts: Option<bool>,

    /// Browser origins allowed by CORS (comma separated, replaces the file's list)
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        help_heading = "Tuning"
    )]
    pub cors_origins: Vec<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file to validate
    #[arg(default_value = "specimen-gate.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:8000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}
