//! Cross-origin access for browser clients.
//!
//! Only the configured origins are allowed, with credentials. Methods and
//! request headers are mirrored from the preflight. The correlation id and
//! `Retry-After` are exposed so browser code can read them.

use http::{header, HeaderValue};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use super::correlation::CORRELATION_HEADER;
use crate::config::model::SecurityConfig;

/// Origins from config that can be sent as header values. `*` never passes
/// validation and is skipped here as well.
fn allowed_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

#[must_use]
pub fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(&security.cors_origins)))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([CORRELATION_HEADER, header::RETRY_AFTER])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_and_unsendable_origins_are_dropped() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "*".to_string(),
            "http://bad\norigin".to_string(),
        ];
        assert_eq!(
            allowed_origins(&origins),
            vec![HeaderValue::from_static("http://localhost:3000")]
        );
    }
}
