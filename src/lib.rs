//! specimen-gate is the request-gatekeeping pipeline of the clinical
//! sample service.
//!
//! Every request passes an ordered chain of guards before it reaches a
//! handler: CORS, correlation ids and access logging, advisory threat signals, per-client sliding
//! window rate limiting, payload size and content-type checks, and a
//! handler deadline. Every response leaves with a fixed set of security
//! headers. Rejections are rendered as structured JSON by one translator.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Gatekeeper config model, file loading, and validation.
//! - [`error`] -- Process-level error types using `thiserror`.
//! - [`api_error`] -- Client-facing error taxonomy and its JSON rendering.
//! - [`health`] -- `GET /health` and `GET /` handlers.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- The guard chain and its shared [`Gatekeeper`](middleware::Gatekeeper) state.
//! - [`server`] -- Axum router, shared application state, and graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file formats |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod api_error;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod server;
