//! Configuration model, loading, and validation.
//!
//! The gatekeeper config is resolved once at startup: an optional file
//! supplies the base ([`loader`]), CLI flags and their env equivalents
//! override individual fields, and the merged result is checked by
//! [`validation::validate`]. The resulting [`GatekeeperConfig`] is shared
//! read-only (behind an `Arc`) by every guard for the process lifetime.

pub mod loader;
pub mod model;
pub mod validation;

pub use model::GatekeeperConfig;
