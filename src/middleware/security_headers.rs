//! Fixed browser-hardening headers on every response.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::{header, HeaderMap, HeaderName, HeaderValue};

use super::Gatekeeper;

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

// Self plus the CDNs serving the API documentation UI.
const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' 'unsafe-eval' https://cdn.jsdelivr.net https://unpkg.com; \
    style-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net https://unpkg.com https://fonts.googleapis.com; \
    img-src 'self' data: https:; \
    connect-src 'self' https://cdn.jsdelivr.net https://unpkg.com; \
    font-src 'self' https://fonts.gstatic.com https://cdn.jsdelivr.net https://unpkg.com; \
    object-src 'none'; \
    base-uri 'self'; \
    form-action 'self'";

const PERMISSIONS: &str = "camera=(), microphone=(), geolocation=(), payment=(), usb=(), \
    accelerometer=(), gyroscope=(), magnetometer=()";

const HSTS: &str = "max-age=31536000; includeSubDomains; preload";

/// Header set applied to every response.
pub const FIXED_HEADERS: [(HeaderName, &str); 6] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
    (PERMISSIONS_POLICY, PERMISSIONS),
];

pub fn apply_security_headers(headers: &mut HeaderMap, hsts_enabled: bool) {
    for (name, value) in FIXED_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    if hsts_enabled {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
    }
}

pub async fn security_headers_middleware(
    State(gatekeeper): State<Gatekeeper>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(
        response.headers_mut(),
        gatekeeper.config().security.hsts_enabled,
    );
    response
}
