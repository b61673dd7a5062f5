//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a resolved [`GatekeeperConfig`] for
//! values the pipeline cannot work with: zero limits, a burst window wider
//! than the sustained window, malformed MIME types, methods or CORS origins,
//! and blank whitelist entries. Every problem is reported, not just the first.

use super::model::{GatekeeperConfig, MIB};
use crate::error::ValidationError;

pub const VALID_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Validate an HTTP method key. Keys must be upper case.
pub fn validate_method(method: &str) -> Result<(), String> {
    if VALID_METHODS.contains(&method) {
        Ok(())
    } else if VALID_METHODS.contains(&method.to_uppercase().as_str()) {
        Err(format!(
            "'{method}' must be upper case (did you mean '{}'?)",
            method.to_uppercase()
        ))
    } else {
        Err(format!("'{method}' is not a valid HTTP method"))
    }
}

/// Validate a bare MIME type such as `application/json`.
pub fn validate_mime(mime: &str) -> Result<(), String> {
    if mime.contains(';') {
        return Err(format!(
            "'{mime}' must not carry parameters (parameters are ignored when matching)"
        ));
    }
    if mime != mime.to_ascii_lowercase() {
        return Err(format!("'{mime}' must be lower case"));
    }
    match mime.split_once('/') {
        Some((kind, sub)) if !kind.is_empty() && !sub.is_empty() && !sub.contains('/') => Ok(()),
        _ => Err(format!("'{mime}' is not a valid MIME type (expected type/subtype)")),
    }
}

/// Validate a CORS origin such as `https://lab.example.org`. Credentials
/// are allowed, so the `*` wildcard is not.
pub fn validate_origin(origin: &str) -> Result<(), String> {
    if origin == "*" {
        return Err("'*' is not allowed with credentials; list origins explicitly".into());
    }
    let Some((scheme, host)) = origin.split_once("://") else {
        return Err(format!("'{origin}' must include a scheme (e.g. 'https://{origin}')"));
    };
    if !matches!(scheme, "http" | "https") || host.is_empty() || host.contains('/') {
        return Err(format!("'{origin}' is not a valid origin (expected scheme://host[:port])"));
    }
    if axum::http::HeaderValue::from_str(origin).is_err() {
        return Err(format!("'{origin}' contains characters not allowed in a header"));
    }
    Ok(())
}

pub fn validate(config: &GatekeeperConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rate = &config.rate_limit;
    if rate.sustained_limit == 0 {
        errors.push(
            ValidationError::new("rate_limit.sustained_limit", "must be greater than 0")
                .with_suggestion("whitelist the client instead of disabling its limit"),
        );
    }
    if rate.burst_limit == 0 {
        errors.push(ValidationError::new(
            "rate_limit.burst_limit",
            "must be greater than 0",
        ));
    }
    if rate.window_size_seconds == 0 {
        errors.push(ValidationError::new(
            "rate_limit.window_size_seconds",
            "must be greater than 0",
        ));
    }
    if rate.burst_window_seconds == 0 {
        errors.push(ValidationError::new(
            "rate_limit.burst_window_seconds",
            "must be greater than 0",
        ));
    } else if rate.burst_window_seconds > rate.window_size_seconds {
        errors.push(
            ValidationError::new(
                "rate_limit.burst_window_seconds",
                format!(
                    "burst window ({}s) cannot exceed the sustained window ({}s)",
                    rate.burst_window_seconds, rate.window_size_seconds
                ),
            )
            .with_suggestion("entries older than the sustained window are already pruned"),
        );
    }
    if rate.cleanup_interval_seconds == 0 {
        errors.push(ValidationError::new(
            "rate_limit.cleanup_interval_seconds",
            "must be greater than 0",
        ));
    }
    for key in &rate.whitelist {
        if key.trim().is_empty() {
            errors.push(ValidationError::new(
                "rate_limit.whitelist",
                "entries cannot be blank",
            ));
        }
    }

    let payload = &config.payload;
    if payload.max_payload_bytes == 0 {
        errors.push(
            ValidationError::new("payload.max_payload_bytes", "must be greater than 0")
                .with_suggestion(format!("the default is {} bytes", 10 * MIB)),
        );
    }
    for (method, types) in &payload.allowed_content_types {
        let field = format!("payload.allowed_content_types.{method}");
        if let Err(message) = validate_method(method) {
            errors.push(ValidationError::new(field.clone(), message));
        }
        if types.is_empty() {
            errors.push(
                ValidationError::new(field.clone(), "allowed set cannot be empty")
                    .with_suggestion("remove the method to skip content-type checks for it"),
            );
        }
        for mime in types {
            if let Err(message) = validate_mime(mime) {
                errors.push(ValidationError::new(field.clone(), message));
            }
        }
    }
    for path in &payload.content_type_exempt_paths {
        if !path.starts_with('/') {
            errors.push(
                ValidationError::new(
                    "payload.content_type_exempt_paths",
                    format!("'{path}' must start with '/'"),
                )
                .with_suggestion(format!("did you mean '/{path}'?")),
            );
        }
    }

    if config.timeout.request_timeout_seconds == 0 {
        errors.push(ValidationError::new(
            "timeout.request_timeout_seconds",
            "must be greater than 0",
        ));
    }

    let security = &config.security;
    if !security.auth_path_prefix.starts_with('/') {
        errors.push(ValidationError::new(
            "security.auth_path_prefix",
            format!("'{}' must start with '/'", security.auth_path_prefix),
        ));
    }
    if security.header_size_soft_limit == 0 {
        errors.push(ValidationError::new(
            "security.header_size_soft_limit",
            "must be greater than 0",
        ));
    }
    for origin in &security.cors_origins {
        if let Err(message) = validate_origin(origin) {
            errors.push(ValidationError::new("security.cors_origins", message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Build a human-readable summary of a validated config.
pub fn format_validation_report(path: &str, config: &GatekeeperConfig) -> String {
    let rate = &config.rate_limit;
    let mut lines = vec![
        format!(
            "  rate limit:  {} per {}s, burst {} per {}s, {} whitelisted",
            rate.sustained_limit,
            rate.window_size_seconds,
            rate.burst_limit,
            rate.burst_window_seconds,
            rate.whitelist.len()
        ),
        format!(
            "  payload:     max {} bytes",
            config.payload.max_payload_bytes
        ),
    ];
    for (method, types) in &config.payload.allowed_content_types {
        let types: Vec<&str> = types.iter().map(String::as_str).collect();
        lines.push(format!("    {method}: {}", types.join(", ")));
    }
    lines.push(format!(
        "  timeout:     {}s",
        config.timeout.request_timeout_seconds
    ));
    lines.push(format!(
        "  cors:        {}",
        config.security.cors_origins.join(", ")
    ));
    lines.push(format!(
        "  hsts:        {}",
        if config.security.hsts_enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));

    format!("{} is valid\n{}", path, lines.join("\n"))
}
